//! Generation parameters and their per-mode shape.
//!
//! [`GenerationConfig`] is the single source of truth for the next request.
//! Fields shared by both generation models live on the struct itself; fields
//! that only one model understands live in [`ModeParams`], so a Loop config
//! cannot carry lyrics and a FullSong config cannot carry a BPM.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::presets::Preset;
use crate::types::Refusal;

pub const MIN_BPM: u32 = 60;
pub const MAX_BPM: u32 = 200;

/// Which generation model the request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    /// Short, tempo-locked loops.
    Loop,
    /// Long-form songs with optional lyrics.
    FullSong,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Loop => "loop",
            Mode::FullSong => "song",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "loop" => Ok(Mode::Loop),
            "song" | "fullsong" => Ok(Mode::FullSong),
            other => Err(format!("unknown mode '{}' (expected loop or song)", other)),
        }
    }
}

/// Major or minor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scale {
    Major,
    Minor,
}

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// One of the 24 canonical major/minor keys, e.g. `F minor`.
///
/// Serialized as its display name. Parsing accepts sharps or flats, any
/// case, and the short forms `Am` / `F#m` / `C`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MusicalKey {
    tonic: u8,
    scale: Scale,
}

impl MusicalKey {
    /// Build a key from a pitch class (0 = C, 11 = B).
    pub fn new(pitch_class: u8, scale: Scale) -> Self {
        Self {
            tonic: pitch_class % 12,
            scale,
        }
    }

    pub fn pitch_class(&self) -> u8 {
        self.tonic
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    /// All 24 keys, majors first.
    pub fn all() -> impl Iterator<Item = MusicalKey> {
        [Scale::Major, Scale::Minor]
            .into_iter()
            .flat_map(|scale| (0..12).map(move |tonic| MusicalKey { tonic, scale }))
    }
}

impl fmt::Display for MusicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = match self.scale {
            Scale::Major => "major",
            Scale::Minor => "minor",
        };
        write!(f, "{} {}", NOTE_NAMES[self.tonic as usize], scale)
    }
}

fn parse_tonic(note: &str) -> Option<u8> {
    let mut chars = note.chars();
    let base: i8 = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };
    let shift: i8 = match chars.next() {
        None => 0,
        Some('#') | Some('♯') => 1,
        Some('b') | Some('♭') => -1,
        Some(_) => return None,
    };
    if chars.next().is_some() {
        return None;
    }
    Some((base + shift).rem_euclid(12) as u8)
}

impl FromStr for MusicalKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("unknown key '{}'", s.trim());
        let parts: Vec<&str> = s.split_whitespace().collect();
        match parts.as_slice() {
            [note, scale] => {
                let scale = match scale.to_ascii_lowercase().as_str() {
                    "major" | "maj" => Scale::Major,
                    "minor" | "min" => Scale::Minor,
                    _ => return Err(invalid()),
                };
                let tonic = parse_tonic(note).ok_or_else(invalid)?;
                Ok(MusicalKey { tonic, scale })
            }
            [short] => {
                if let Some(tonic) = parse_tonic(short) {
                    return Ok(MusicalKey {
                        tonic,
                        scale: Scale::Major,
                    });
                }
                let note = short.strip_suffix('m').ok_or_else(invalid)?;
                let tonic = parse_tonic(note).ok_or_else(invalid)?;
                Ok(MusicalKey {
                    tonic,
                    scale: Scale::Minor,
                })
            }
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for MusicalKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MusicalKey> for String {
    fn from(key: MusicalKey) -> Self {
        key.to_string()
    }
}

/// Noise scheduler used by the song model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerType {
    #[default]
    Euler,
    Dpm,
    Ddim,
}

impl FromStr for SchedulerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euler" => Ok(SchedulerType::Euler),
            "dpm" => Ok(SchedulerType::Dpm),
            "ddim" => Ok(SchedulerType::Ddim),
            other => Err(format!("unknown scheduler '{}'", other)),
        }
    }
}

/// Classifier-free guidance flavour used by the song model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CfgType {
    #[default]
    Apg,
    Standard,
}

impl FromStr for CfgType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "apg" => Ok(CfgType::Apg),
            "standard" => Ok(CfgType::Standard),
            other => Err(format!("unknown cfg type '{}'", other)),
        }
    }
}

/// Loop-only sampler settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopParams {
    pub bpm: u32,
    pub temperature: f64,
    pub top_k: u32,
}

impl Default for LoopParams {
    fn default() -> Self {
        Self {
            bpm: 120,
            temperature: 1.0,
            top_k: 250,
        }
    }
}

/// FullSong-only settings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SongParams {
    pub lyrics: String,
    pub scheduler: SchedulerType,
    pub cfg_type: CfgType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModeParams {
    Loop(LoopParams),
    FullSong(SongParams),
}

/// The configuration of the next generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub prompt: String,
    pub negative_prompt: String,
    pub key: Option<MusicalKey>,
    /// Bars-equivalent for loops, seconds for songs.
    pub duration_seconds: f64,
    pub steps: u32,
    pub guidance_scale: f64,
    /// `None` lets the backend pick a random seed.
    pub seed: Option<u64>,
    pub params: ModeParams,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let mut config = Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            key: None,
            duration_seconds: 0.0,
            steps: 0,
            guidance_scale: 0.0,
            seed: None,
            params: ModeParams::Loop(LoopParams::default()),
        };
        config.set_mode(Mode::Loop);
        config
    }
}

impl GenerationConfig {
    /// A fresh config in the given mode with that mode's defaults.
    pub fn new(mode: Mode) -> Self {
        let mut config = Self::default();
        config.set_mode(mode);
        config
    }

    pub fn mode(&self) -> Mode {
        match self.params {
            ModeParams::Loop(_) => Mode::Loop,
            ModeParams::FullSong(_) => Mode::FullSong,
        }
    }

    /// Switch generation model.
    ///
    /// Resets every mode-specific field to the new mode's defaults and clears
    /// the prompts; prompts written for one model do not carry over to the
    /// other. `key` and `seed` are kept.
    pub fn set_mode(&mut self, mode: Mode) {
        self.prompt.clear();
        self.negative_prompt.clear();
        match mode {
            Mode::Loop => {
                self.duration_seconds = 4.0;
                self.steps = 200;
                self.guidance_scale = 7.0;
                self.params = ModeParams::Loop(LoopParams::default());
            }
            Mode::FullSong => {
                self.duration_seconds = 30.0;
                self.steps = 60;
                self.guidance_scale = 15.0;
                self.params = ModeParams::FullSong(SongParams::default());
            }
        }
    }

    /// Merge a saved preset into this config. Fields the preset does not
    /// carry are left untouched.
    pub fn apply_preset(&mut self, preset: &Preset) {
        if preset.mode != self.mode() {
            self.set_mode(preset.mode);
        }
        self.prompt = preset.prompt.clone();
        if let (Some(bpm), ModeParams::Loop(params)) = (preset.bpm, &mut self.params) {
            params.bpm = bpm;
        }
        if let Some(key) = preset.key {
            self.key = Some(key);
        }
    }

    /// Append an enhancement's phrases to the prompts. Repeated application
    /// is a no-op.
    pub fn apply_enhancement(&mut self, enhancement: Enhancement) {
        append_phrase(&mut self.prompt, enhancement.prompt_suffix());
        append_phrase(&mut self.negative_prompt, enhancement.negative_suffix());
    }

    pub fn loop_params(&self) -> Option<&LoopParams> {
        match &self.params {
            ModeParams::Loop(params) => Some(params),
            ModeParams::FullSong(_) => None,
        }
    }

    pub fn song_params(&self) -> Option<&SongParams> {
        match &self.params {
            ModeParams::FullSong(params) => Some(params),
            ModeParams::Loop(_) => None,
        }
    }

    pub fn set_bpm(&mut self, bpm: u32) -> bool {
        match &mut self.params {
            ModeParams::Loop(params) => {
                params.bpm = bpm;
                true
            }
            ModeParams::FullSong(_) => false,
        }
    }

    pub fn set_temperature(&mut self, temperature: f64) -> bool {
        match &mut self.params {
            ModeParams::Loop(params) => {
                params.temperature = temperature;
                true
            }
            ModeParams::FullSong(_) => false,
        }
    }

    pub fn set_top_k(&mut self, top_k: u32) -> bool {
        match &mut self.params {
            ModeParams::Loop(params) => {
                params.top_k = top_k;
                true
            }
            ModeParams::FullSong(_) => false,
        }
    }

    pub fn set_lyrics(&mut self, lyrics: impl Into<String>) -> bool {
        match &mut self.params {
            ModeParams::FullSong(params) => {
                params.lyrics = lyrics.into();
                true
            }
            ModeParams::Loop(_) => false,
        }
    }

    pub fn set_scheduler(&mut self, scheduler: SchedulerType) -> bool {
        match &mut self.params {
            ModeParams::FullSong(params) => {
                params.scheduler = scheduler;
                true
            }
            ModeParams::Loop(_) => false,
        }
    }

    pub fn set_cfg_type(&mut self, cfg_type: CfgType) -> bool {
        match &mut self.params {
            ModeParams::FullSong(params) => {
                params.cfg_type = cfg_type;
                true
            }
            ModeParams::Loop(_) => false,
        }
    }

    /// Check the config is submittable. Called by the pipeline right before
    /// a request is built.
    pub fn validate(&self) -> Result<(), Refusal> {
        if self.prompt.trim().is_empty() {
            return Err(Refusal::EmptyPrompt);
        }
        if let ModeParams::Loop(params) = &self.params {
            if !(MIN_BPM..=MAX_BPM).contains(&params.bpm) {
                return Err(Refusal::InvalidParameter(format!(
                    "bpm {} is outside {}-{}",
                    params.bpm, MIN_BPM, MAX_BPM
                )));
            }
            if !params.temperature.is_finite() {
                return Err(Refusal::InvalidParameter(
                    "temperature must be a finite number".into(),
                ));
            }
        }
        if !self.guidance_scale.is_finite() {
            return Err(Refusal::InvalidParameter(
                "guidance must be a finite number".into(),
            ));
        }
        if !self.duration_seconds.is_finite() || self.duration_seconds <= 0.0 {
            return Err(Refusal::InvalidParameter(
                "duration must be greater than zero".into(),
            ));
        }
        if self.steps == 0 {
            return Err(Refusal::InvalidParameter(
                "steps must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn append_phrase(target: &mut String, phrase: &str) {
    if target.contains(phrase) {
        return;
    }
    if target.trim().is_empty() {
        *target = phrase.to_string();
    } else {
        target.push_str(", ");
        target.push_str(phrase);
    }
}

/// Predefined prompt modifiers that bias the generation style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Enhancement {
    HighQuality,
    Punchy,
    Warm,
    Clean,
}

impl Enhancement {
    pub const ALL: [Enhancement; 4] = [
        Enhancement::HighQuality,
        Enhancement::Punchy,
        Enhancement::Warm,
        Enhancement::Clean,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Enhancement::HighQuality => "hq",
            Enhancement::Punchy => "punchy",
            Enhancement::Warm => "warm",
            Enhancement::Clean => "clean",
        }
    }

    pub fn prompt_suffix(&self) -> &'static str {
        match self {
            Enhancement::HighQuality => "high quality, studio recording",
            Enhancement::Punchy => "punchy, tight transients, crisp",
            Enhancement::Warm => "warm analog tone, vintage saturation",
            Enhancement::Clean => "clean mix, dry signal",
        }
    }

    pub fn negative_suffix(&self) -> &'static str {
        match self {
            Enhancement::HighQuality => "low quality, distorted, noisy",
            Enhancement::Punchy => "muddy, weak, washed out",
            Enhancement::Warm => "harsh, thin, digital clipping",
            Enhancement::Clean => "reverb, echo, background noise",
        }
    }
}

impl FromStr for Enhancement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Enhancement::ALL
            .into_iter()
            .find(|e| e.name() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown enhancement '{}' (expected one of: hq, punchy, warm, clean)",
                    wanted
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loop_config(prompt: &str) -> GenerationConfig {
        let mut config = GenerationConfig::new(Mode::Loop);
        config.prompt = prompt.to_string();
        config
    }

    #[test]
    fn test_default_is_loop() {
        let config = GenerationConfig::default();
        assert_eq!(config.mode(), Mode::Loop);
        assert_eq!(config.duration_seconds, 4.0);
        assert_eq!(config.steps, 200);
        assert_eq!(config.guidance_scale, 7.0);
        assert!(config.prompt.is_empty());
    }

    #[test]
    fn test_set_mode_resets_and_keeps_key() {
        let mut config = loop_config("dusty boom bap drums");
        config.key = Some("F minor".parse().unwrap());
        config.seed = Some(42);
        config.set_bpm(90);

        config.set_mode(Mode::FullSong);
        assert_eq!(config.mode(), Mode::FullSong);
        assert_eq!(config.prompt, "");
        assert_eq!(config.duration_seconds, 30.0);
        assert_eq!(config.steps, 60);
        assert_eq!(config.guidance_scale, 15.0);
        assert_eq!(config.song_params(), Some(&SongParams::default()));
        assert_eq!(config.key.unwrap().to_string(), "F minor");
        assert_eq!(config.seed, Some(42));

        config.prompt = "city pop ballad".into();
        config.set_mode(Mode::Loop);
        assert_eq!(config.prompt, "");
        assert_eq!(config.loop_params().unwrap().bpm, 120);
        assert_eq!(config.duration_seconds, 4.0);
    }

    #[test]
    fn test_set_mode_same_mode_still_resets() {
        let mut config = loop_config("hats");
        config.set_bpm(170);
        config.set_mode(Mode::Loop);
        assert_eq!(config.prompt, "");
        assert_eq!(config.loop_params().unwrap().bpm, 120);
    }

    #[test]
    fn test_mode_specific_setters() {
        let mut config = GenerationConfig::new(Mode::FullSong);
        assert!(!config.set_bpm(100));
        assert!(!config.set_temperature(0.5));
        assert!(config.set_lyrics("[verse] hello"));
        assert!(config.set_scheduler(SchedulerType::Ddim));

        let mut config = GenerationConfig::new(Mode::Loop);
        assert!(!config.set_lyrics("nope"));
        assert!(!config.set_cfg_type(CfgType::Standard));
        assert!(config.set_top_k(50));
    }

    #[test]
    fn test_enhancement_is_idempotent() {
        let mut once = loop_config("808 kick loop");
        once.apply_enhancement(Enhancement::Punchy);

        let mut twice = loop_config("808 kick loop");
        twice.apply_enhancement(Enhancement::Punchy);
        twice.apply_enhancement(Enhancement::Punchy);

        assert_eq!(once.prompt, twice.prompt);
        assert_eq!(once.negative_prompt, twice.negative_prompt);
        assert_eq!(once.prompt, "808 kick loop, punchy, tight transients, crisp");
        assert_eq!(once.negative_prompt, "muddy, weak, washed out");
    }

    #[test]
    fn test_enhancements_stack_when_different() {
        let mut config = loop_config("pad");
        config.apply_enhancement(Enhancement::Warm);
        config.apply_enhancement(Enhancement::Clean);
        assert!(config.prompt.contains("warm analog tone"));
        assert!(config.prompt.contains("clean mix"));
        assert!(config.negative_prompt.starts_with("harsh"));
    }

    #[test]
    fn test_validate() {
        let config = GenerationConfig::default();
        assert_eq!(config.validate(), Err(Refusal::EmptyPrompt));

        let config = loop_config("   ");
        assert_eq!(config.validate(), Err(Refusal::EmptyPrompt));

        let mut config = loop_config("kick");
        assert!(config.validate().is_ok());

        config.set_bpm(201);
        assert!(matches!(
            config.validate(),
            Err(Refusal::InvalidParameter(_))
        ));
        config.set_bpm(60);
        config.duration_seconds = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_numbers() {
        let mut config = loop_config("kick");
        config.guidance_scale = f64::NAN;
        assert!(matches!(
            config.validate(),
            Err(Refusal::InvalidParameter(_))
        ));

        config.guidance_scale = 7.0;
        config.set_temperature(f64::INFINITY);
        assert!(matches!(
            config.validate(),
            Err(Refusal::InvalidParameter(_))
        ));

        config.set_temperature(0.9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_preset_switches_mode_and_merges() {
        let mut config = GenerationConfig::new(Mode::FullSong);
        config.seed = Some(7);
        config.guidance_scale = 12.0;

        let preset = Preset {
            id: "p1".into(),
            label: "acid bass".into(),
            prompt: "acid bass line".into(),
            mode: Mode::Loop,
            bpm: Some(128),
            key: Some("A minor".parse().unwrap()),
            created_at: None,
        };
        config.apply_preset(&preset);

        assert_eq!(config.mode(), Mode::Loop);
        assert_eq!(config.prompt, "acid bass line");
        assert_eq!(config.loop_params().unwrap().bpm, 128);
        assert_eq!(config.key.unwrap().to_string(), "A minor");
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn test_apply_preset_same_mode_keeps_other_fields() {
        let mut config = loop_config("old");
        config.steps = 90;
        config.key = Some("C major".parse().unwrap());
        let preset = Preset {
            id: "p2".into(),
            label: "new".into(),
            prompt: "new".into(),
            mode: Mode::Loop,
            bpm: None,
            key: None,
            created_at: None,
        };
        config.apply_preset(&preset);
        assert_eq!(config.prompt, "new");
        assert_eq!(config.steps, 90);
        assert_eq!(config.key.unwrap().to_string(), "C major");
    }

    #[test]
    fn test_parse_keys() {
        let key: MusicalKey = "F minor".parse().unwrap();
        assert_eq!(key.pitch_class(), 5);
        assert_eq!(key.scale(), Scale::Minor);

        assert_eq!("bb major".parse::<MusicalKey>().unwrap().to_string(), "A# major");
        assert_eq!("F#m".parse::<MusicalKey>().unwrap().to_string(), "F# minor");
        assert_eq!("Am".parse::<MusicalKey>().unwrap().to_string(), "A minor");
        assert_eq!("E".parse::<MusicalKey>().unwrap().to_string(), "E major");
        assert_eq!("Cb min".parse::<MusicalKey>().unwrap().to_string(), "B minor");
        assert!("H major".parse::<MusicalKey>().is_err());
        assert!("C dorian".parse::<MusicalKey>().is_err());
        assert!("".parse::<MusicalKey>().is_err());
    }

    #[test]
    fn test_all_keys() {
        let keys: Vec<String> = MusicalKey::all().map(|k| k.to_string()).collect();
        assert_eq!(keys.len(), 24);
        assert_eq!(keys[0], "C major");
        assert_eq!(keys[23], "B minor");
    }

    #[test]
    fn test_key_serde() {
        let key: MusicalKey = "G minor".parse().unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"G minor\"");
        let back: MusicalKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<MusicalKey>("\"X minor\"").is_err());
    }

    #[test]
    fn test_parse_mode_and_enums() {
        assert_eq!("loop".parse::<Mode>().unwrap(), Mode::Loop);
        assert_eq!("full-song".parse::<Mode>().unwrap(), Mode::FullSong);
        assert_eq!("Song".parse::<Mode>().unwrap(), Mode::FullSong);
        assert!("oneshot".parse::<Mode>().is_err());
        assert_eq!("DPM".parse::<SchedulerType>().unwrap(), SchedulerType::Dpm);
        assert_eq!("standard".parse::<CfgType>().unwrap(), CfgType::Standard);
        assert_eq!("hq".parse::<Enhancement>().unwrap(), Enhancement::HighQuality);
        assert!("loud".parse::<Enhancement>().is_err());
    }
}
