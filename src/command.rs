//! Line-oriented front-end commands.

use std::str::FromStr;
use thiserror::Error;

use crate::params::{CfgType, Enhancement, Mode, MusicalKey, SchedulerType};

/// A command typed at the front-end prompt.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Mode(Mode),
    Prompt(String),
    Negative(String),
    Bpm(u32),
    /// `None` clears the key.
    Key(Option<MusicalKey>),
    Length(f64),
    Steps(u32),
    Guidance(f64),
    /// `None` lets the backend choose.
    Seed(Option<u64>),
    Temperature(f64),
    TopK(u32),
    Lyrics(String),
    Scheduler(SchedulerType),
    Cfg(CfgType),
    Enhance(Enhancement),
    Generate,
    Cancel,
    Dismiss,
    Play,
    /// Percentage of the track, 0-100.
    Seek(f64),
    /// Percentage, 0-100.
    Volume(f32),
    Mute,
    Repeat(bool),
    Reveal,
    Drag,
    /// Remove the current result from disk.
    Delete,
    PresetSave,
    PresetList,
    PresetLoad(String),
    PresetRemove(String),
    PresetClear,
    Show,
    Status,
    Help,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),

    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),

    #[error("invalid argument for '{command}': {reason}")]
    InvalidArgument {
        command: &'static str,
        reason: String,
    },
}

pub const HELP: &str = "\
mode loop|song          switch model (resets prompts and mode settings)
prompt <text>           set the prompt
negative <text>         set the negative prompt
bpm <n>                 loop tempo (60-200)
key <name>|none         musical key, e.g. 'F minor', 'C#', 'Am'
length <n>              duration in seconds
steps <n>               sampling steps
guidance <x>            guidance scale
seed <n>|random         fixed seed or backend-chosen
temperature <x>         loop sampling temperature
topk <n>                loop top-k
lyrics <text>           song lyrics
scheduler euler|dpm|ddim
cfg apg|standard
enhance hq|punchy|warm|clean
generate | cancel | dismiss
play | seek <0-100> | volume <0-100> | mute | repeat on|off
reveal | drag | delete
preset save|list|load <id>|rm <id>|clear
show | status | help | quit";

fn required<'a>(command: &'static str, arg: &'a str) -> Result<&'a str, CommandError> {
    if arg.is_empty() {
        Err(CommandError::MissingArgument(command))
    } else {
        Ok(arg)
    }
}

fn parsed<T>(command: &'static str, arg: &str) -> Result<T, CommandError>
where
    T: FromStr,
    T::Err: ToString,
{
    required(command, arg)?
        .parse::<T>()
        .map_err(|e| CommandError::InvalidArgument {
            command,
            reason: e.to_string(),
        })
}

fn percent(command: &'static str, arg: &str) -> Result<f64, CommandError> {
    let value: f64 = parsed(command, arg)?;
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(CommandError::InvalidArgument {
            command,
            reason: format!("{} is outside 0-100", value),
        });
    }
    Ok(value)
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (head, rest) = match line.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (line, ""),
        };
        if head.is_empty() {
            return Err(CommandError::Empty);
        }

        let command = match head.to_ascii_lowercase().as_str() {
            "mode" => Command::Mode(parsed("mode", rest)?),
            "prompt" => Command::Prompt(rest.to_string()),
            "negative" => Command::Negative(rest.to_string()),
            "bpm" => Command::Bpm(parsed("bpm", rest)?),
            "key" => match required("key", rest)?.to_ascii_lowercase().as_str() {
                "none" | "off" | "-" => Command::Key(None),
                _ => Command::Key(Some(parsed("key", rest)?)),
            },
            "length" => Command::Length(parsed("length", rest)?),
            "steps" => Command::Steps(parsed("steps", rest)?),
            "guidance" => Command::Guidance(parsed("guidance", rest)?),
            "seed" => match required("seed", rest)?.to_ascii_lowercase().as_str() {
                "random" | "none" => Command::Seed(None),
                _ => Command::Seed(Some(parsed("seed", rest)?)),
            },
            "temperature" | "temp" => Command::Temperature(parsed("temperature", rest)?),
            "topk" | "top_k" => Command::TopK(parsed("topk", rest)?),
            "lyrics" => Command::Lyrics(rest.to_string()),
            "scheduler" => Command::Scheduler(parsed("scheduler", rest)?),
            "cfg" => Command::Cfg(parsed("cfg", rest)?),
            "enhance" => Command::Enhance(parsed("enhance", rest)?),
            "generate" | "gen" | "g" => Command::Generate,
            "cancel" => Command::Cancel,
            "dismiss" => Command::Dismiss,
            "play" | "pause" | "p" => Command::Play,
            "seek" => Command::Seek(percent("seek", rest)?),
            "volume" | "vol" => Command::Volume(percent("volume", rest)? as f32),
            "mute" => Command::Mute,
            "repeat" => match required("repeat", rest)?.to_ascii_lowercase().as_str() {
                "on" | "true" | "yes" => Command::Repeat(true),
                "off" | "false" | "no" => Command::Repeat(false),
                other => {
                    return Err(CommandError::InvalidArgument {
                        command: "repeat",
                        reason: format!("expected on or off, got '{}'", other),
                    })
                }
            },
            "reveal" => Command::Reveal,
            "drag" => Command::Drag,
            "delete" | "del" => Command::Delete,
            "preset" => {
                let (action, arg) = match rest.split_once(char::is_whitespace) {
                    Some((action, arg)) => (action, arg.trim()),
                    None => (rest, ""),
                };
                match required("preset", action)?.to_ascii_lowercase().as_str() {
                    "save" => Command::PresetSave,
                    "list" | "ls" => Command::PresetList,
                    "load" => Command::PresetLoad(required("preset load", arg)?.to_string()),
                    "clear" => Command::PresetClear,
                    "rm" | "remove" | "delete" => {
                        Command::PresetRemove(required("preset rm", arg)?.to_string())
                    }
                    other => {
                        return Err(CommandError::InvalidArgument {
                            command: "preset",
                            reason: format!("unknown action '{}'", other),
                        })
                    }
                }
            }
            "show" => Command::Show,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}
