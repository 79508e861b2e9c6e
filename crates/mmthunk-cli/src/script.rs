//! Replay scripts: a TOML list of 16-bit calls

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

fn default_buffer() -> u16 {
    128
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Files preloaded into the loopback MMIO store
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

impl Script {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Invalid replay script")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read script {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("In {}", path.display()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusItem {
    Length,
    Position,
    Mode,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfoItem {
    Product,
    File,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeekOrigin {
    #[default]
    Set,
    Cur,
    End,
}

/// One 16-bit call. Devices are named by alias, device type or numeric id;
/// MMIO files by the name they were opened with.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Step {
    Open {
        device_type: String,
        alias: Option<String>,
        element: Option<String>,
    },
    Status {
        device: String,
        item: StatusItem,
    },
    Info {
        device: String,
        item: InfoItem,
        #[serde(default = "default_buffer")]
        buffer: u16,
    },
    /// Number of open devices, or the name of the `number`th one
    Sysinfo {
        number: Option<u32>,
        #[serde(default = "default_buffer")]
        buffer: u16,
    },
    Play {
        device: String,
    },
    Stop {
        device: String,
    },
    Pause {
        device: String,
    },
    Close {
        device: String,
    },
    /// `proc` is a 16:16 address written `ssss:oooo`
    SetYield {
        device: String,
        proc: String,
        #[serde(default)]
        data: u32,
    },
    Yield {
        device: String,
    },
    #[serde(rename = "string")]
    SendString {
        command: String,
        #[serde(default = "default_buffer")]
        buffer: u16,
    },
    MmioOpen {
        file: String,
        #[serde(default)]
        create: bool,
    },
    MmioRead {
        file: String,
        len: u16,
    },
    MmioWrite {
        file: String,
        text: String,
    },
    MmioSeek {
        file: String,
        offset: i32,
        #[serde(default)]
        origin: SeekOrigin,
    },
    MmioClose {
        file: String,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Open { .. } => "open",
            Step::Status { .. } => "status",
            Step::Info { .. } => "info",
            Step::Sysinfo { .. } => "sysinfo",
            Step::Play { .. } => "play",
            Step::Stop { .. } => "stop",
            Step::Pause { .. } => "pause",
            Step::Close { .. } => "close",
            Step::SetYield { .. } => "set-yield",
            Step::Yield { .. } => "yield",
            Step::SendString { .. } => "string",
            Step::MmioOpen { .. } => "mmio-open",
            Step::MmioRead { .. } => "mmio-read",
            Step::MmioWrite { .. } => "mmio-write",
            Step::MmioSeek { .. } => "mmio-seek",
            Step::MmioClose { .. } => "mmio-close",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_steps() {
        let script = Script::parse(
            r#"
            [files]
            "a.wav" = "RIFF"

            [[step]]
            op = "open"
            device_type = "waveaudio"
            alias = "w"

            [[step]]
            op = "status"
            device = "w"
            item = "mode"

            [[step]]
            op = "mmio-seek"
            file = "a.wav"
            offset = 2
            "#,
        )
        .unwrap();

        assert_eq!(script.files["a.wav"], "RIFF");
        assert_eq!(script.steps.len(), 3);
        assert!(matches!(
            &script.steps[0],
            Step::Open { alias: Some(a), element: None, .. } if a == "w"
        ));
        assert!(matches!(
            script.steps[2],
            Step::MmioSeek { origin: SeekOrigin::Set, offset: 2, .. }
        ));
        assert_eq!(script.steps[1].name(), "status");
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        let err = Script::parse("[[step]]\nop = \"eject\"\n").unwrap_err();
        assert!(err.to_string().contains("Invalid replay script"));
    }
}
