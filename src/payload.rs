use serde::{Deserialize, Serialize};

use crate::params::{CfgType, GenerationConfig, ModeParams, SchedulerType};

/// JSON body of `POST /generate`.
///
/// Built from a [`GenerationConfig`]. Fields that do not apply to the
/// config's mode are `None` and never serialized, not even as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratePayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub length: f64,
    pub steps: u32,
    pub guidance: f64,
    pub variations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    // loop model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    // song model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler_type: Option<SchedulerType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg_type: Option<CfgType>,
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl GeneratePayload {
    /// Build the request body for the config's current mode.
    pub fn from_config(config: &GenerationConfig) -> Self {
        let mut payload = Self {
            kind: config.mode().as_str().to_string(),
            prompt: config.prompt.trim().to_string(),
            key: config.key.map(|k| k.to_string()),
            length: config.duration_seconds,
            steps: config.steps,
            guidance: config.guidance_scale,
            variations: 1,
            seed: config.seed,
            bpm: None,
            temperature: None,
            top_k: None,
            negative_prompt: None,
            lyrics: None,
            scheduler_type: None,
            cfg_type: None,
        };

        match &config.params {
            ModeParams::Loop(params) => {
                payload.bpm = Some(params.bpm);
                payload.temperature = Some(params.temperature);
                payload.top_k = Some(params.top_k);
            }
            ModeParams::FullSong(params) => {
                payload.negative_prompt = non_empty(&config.negative_prompt);
                payload.lyrics = non_empty(&params.lyrics);
                payload.scheduler_type = Some(params.scheduler);
                payload.cfg_type = Some(params.cfg_type);
            }
        }

        payload
    }
}

/// One file produced by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub file: String,
    #[serde(default)]
    pub path: Option<String>,
}

/// Body of a successful `POST /generate` response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub files: Vec<GeneratedFile>,
    /// Location of the first file, repeated for convenience.
    #[serde(default)]
    pub path: Option<String>,
}

impl GenerateResponse {
    /// A response carrying a single file; handy for tests and demos.
    pub fn single(file: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            status: Some("success".into()),
            files: vec![GeneratedFile {
                file: file.into(),
                path: Some(path.clone()),
            }],
            path: Some(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Enhancement, Mode};
    use serde_json::Value;

    fn to_json(config: &GenerationConfig) -> Value {
        serde_json::to_value(GeneratePayload::from_config(config)).unwrap()
    }

    #[test]
    fn test_loop_payload_shape() {
        let mut config = GenerationConfig::new(Mode::Loop);
        config.prompt = "808 kick loop".into();
        config.set_bpm(140);
        config.key = Some("F minor".parse().unwrap());
        config.apply_enhancement(Enhancement::Punchy);

        let json = to_json(&config);
        assert_eq!(json["type"], "loop");
        assert_eq!(json["bpm"], 140);
        assert_eq!(json["key"], "F minor");
        assert_eq!(json["length"], 4.0);
        assert_eq!(json["variations"], 1);
        assert_eq!(json["steps"], 200);
        assert_eq!(json["temperature"], 1.0);
        assert_eq!(json["top_k"], 250);
        assert!(json.get("negative_prompt").is_none());
        assert!(json.get("lyrics").is_none());
        assert!(json.get("scheduler_type").is_none());
        assert!(json.get("seed").is_none());
    }

    #[test]
    fn test_song_payload_shape() {
        let mut config = GenerationConfig::new(Mode::FullSong);
        config.prompt = "dreamy shoegaze".into();
        config.negative_prompt = "lofi".into();
        config.set_lyrics("[verse]\nfloating");
        config.seed = Some(1234);

        let json = to_json(&config);
        assert_eq!(json["type"], "song");
        assert_eq!(json["steps"], 60);
        assert_eq!(json["guidance"], 15.0);
        assert_eq!(json["negative_prompt"], "lofi");
        assert_eq!(json["lyrics"], "[verse]\nfloating");
        assert_eq!(json["scheduler_type"], "euler");
        assert_eq!(json["cfg_type"], "apg");
        assert_eq!(json["seed"], 1234);
        assert!(json.get("bpm").is_none());
        assert!(json.get("temperature").is_none());
        assert!(json.get("top_k").is_none());
    }

    #[test]
    fn test_empty_optionals_are_omitted_not_null() {
        let mut config = GenerationConfig::new(Mode::FullSong);
        config.prompt = "ambient".into();
        config.negative_prompt = "  ".into();

        let json = to_json(&config);
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("negative_prompt"));
        assert!(!obj.contains_key("lyrics"));
        assert!(!obj.contains_key("key"));
        assert!(obj.values().all(|v| !v.is_null()));
    }

    #[test]
    fn test_parse_generate_response() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{
            "status": "success",
            "files": [
                {"file": "loop_140bpm_F minor_001.wav", "path": "/samples/loops/loop_140bpm_F minor_001.wav"},
                {"file": "loop_140bpm_F minor_002.wav", "path": "/samples/loops/loop_140bpm_F minor_002.wav"}
            ],
            "path": "/samples/loops/loop_140bpm_F minor_001.wav"
        }"#,
        )
        .unwrap();

        assert_eq!(response.files.len(), 2);
        assert_eq!(response.files[0].file, "loop_140bpm_F minor_001.wav");
    }

    #[test]
    fn test_parse_sparse_response() {
        let response: GenerateResponse = serde_json::from_str(r#"{"files": []}"#).unwrap();
        assert!(response.files.is_empty());
        assert!(response.path.is_none());
    }
}
