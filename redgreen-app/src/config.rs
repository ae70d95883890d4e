use anyhow::{Context, Result};
use redgreen_core::ResponseKey;
use redgreen_experiment::ExperimentConfig;
use redgreen_net::ClientConfig;
use redgreen_render::RenderConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;
use winit::keyboard::KeyCode;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub client: ClientConfig,
    pub keys: KeyBindings,
    pub audio: AudioConfig,
    pub render: RenderConfig,
    pub experiment: ExperimentConfig,
    /// How often the backend is asked whether the session has expired.
    pub check_timeout_interval_secs: u64,
    pub fullscreen: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            keys: KeyBindings::default(),
            audio: AudioConfig::default(),
            render: RenderConfig::default(),
            experiment: ExperimentConfig::default(),
            check_timeout_interval_secs: 300,
            fullscreen: true,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn check_timeout_interval(&self) -> Duration {
        Duration::from_secs(self.check_timeout_interval_secs.max(1))
    }
}

/// Physical key names per logical action, e.g. `"F"`, `"1"`, `"Numpad1"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub red: Vec<String>,
    pub green: Vec<String>,
    pub acknowledge: Vec<String>,
    pub pause: Vec<String>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        let names = |keys: &[&str]| keys.iter().map(|k| k.to_string()).collect();
        Self {
            red: names(&["F", "1", "Numpad1"]),
            green: names(&["J", "2", "Numpad2"]),
            acknowledge: names(&["Space"]),
            pause: names(&["Escape"]),
        }
    }
}

impl KeyBindings {
    /// Response key bindings. Unknown names are skipped with a warning.
    pub fn responses(&self) -> Vec<(KeyCode, ResponseKey)> {
        let red = codes(&self.red).map(|k| (k, ResponseKey::Red));
        let green = codes(&self.green).map(|k| (k, ResponseKey::Green));
        red.chain(green).collect()
    }

    pub fn acknowledge_keys(&self) -> Vec<KeyCode> {
        codes(&self.acknowledge).collect()
    }

    pub fn pause_keys(&self) -> Vec<KeyCode> {
        codes(&self.pause).collect()
    }
}

fn codes(names: &[String]) -> impl Iterator<Item = KeyCode> + '_ {
    names.iter().filter_map(|name| {
        let code = parse_key_code(name);
        if code.is_none() {
            warn!("ignoring unknown key binding {name:?}");
        }
        code
    })
}

pub fn parse_key_code(name: &str) -> Option<KeyCode> {
    use KeyCode as K;
    const LETTERS: [KeyCode; 26] = [
        K::KeyA, K::KeyB, K::KeyC, K::KeyD, K::KeyE, K::KeyF, K::KeyG, K::KeyH, K::KeyI,
        K::KeyJ, K::KeyK, K::KeyL, K::KeyM, K::KeyN, K::KeyO, K::KeyP, K::KeyQ, K::KeyR,
        K::KeyS, K::KeyT, K::KeyU, K::KeyV, K::KeyW, K::KeyX, K::KeyY, K::KeyZ,
    ];
    const DIGITS: [KeyCode; 10] = [
        K::Digit0, K::Digit1, K::Digit2, K::Digit3, K::Digit4,
        K::Digit5, K::Digit6, K::Digit7, K::Digit8, K::Digit9,
    ];
    const NUMPAD: [KeyCode; 10] = [
        K::Numpad0, K::Numpad1, K::Numpad2, K::Numpad3, K::Numpad4,
        K::Numpad5, K::Numpad6, K::Numpad7, K::Numpad8, K::Numpad9,
    ];

    let name = name.trim();
    let digit = |s: &str| s.parse::<usize>().ok().filter(|d| *d < 10);
    if let Some(rest) = name.strip_prefix("Numpad") {
        return digit(rest).map(|d| NUMPAD[d]);
    }
    if let Some(rest) = name.strip_prefix("Digit") {
        return digit(rest).map(|d| DIGITS[d]);
    }
    let single = name.strip_prefix("Key").filter(|r| r.len() == 1).unwrap_or(name);
    let mut chars = single.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_alphabetic() {
            return Some(LETTERS[(c.to_ascii_uppercase() as u8 - b'A') as usize]);
        }
        if let Some(d) = c.to_digit(10) {
            return Some(DIGITS[d as usize]);
        }
    }
    Some(match name.to_ascii_lowercase().as_str() {
        "space" => K::Space,
        "enter" | "return" => K::Enter,
        "escape" | "esc" => K::Escape,
        "arrowleft" | "left" => K::ArrowLeft,
        "arrowright" | "right" => K::ArrowRight,
        "arrowup" | "up" => K::ArrowUp,
        "arrowdown" | "down" => K::ArrowDown,
        "shiftleft" => K::ShiftLeft,
        "shiftright" => K::ShiftRight,
        "controlleft" => K::ControlLeft,
        "controlright" => K::ControlRight,
        "slash" => K::Slash,
        "period" => K::Period,
        "comma" => K::Comma,
        _ => return None,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    pub volume: f32,
    /// Recorded clip played instead of the synthesised start tone.
    pub start_file: Option<PathBuf>,
    pub end_file: Option<PathBuf>,
    pub start_hz: f32,
    pub end_hz: f32,
    pub tone_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        use redgreen_experiment::{END_TONE, START_TONE};
        Self {
            enabled: true,
            volume: 0.5,
            start_file: None,
            end_file: None,
            start_hz: START_TONE.frequency_hz,
            end_hz: END_TONE.frequency_hz,
            tone_ms: START_TONE.duration.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names() {
        assert_eq!(parse_key_code("F"), Some(KeyCode::KeyF));
        assert_eq!(parse_key_code("j"), Some(KeyCode::KeyJ));
        assert_eq!(parse_key_code("KeyJ"), Some(KeyCode::KeyJ));
        assert_eq!(parse_key_code("1"), Some(KeyCode::Digit1));
        assert_eq!(parse_key_code("Numpad2"), Some(KeyCode::Numpad2));
        assert_eq!(parse_key_code("Space"), Some(KeyCode::Space));
        assert_eq!(parse_key_code("Escape"), Some(KeyCode::Escape));
        assert_eq!(parse_key_code("Numpad12"), None);
        assert_eq!(parse_key_code("Hyper"), None);
    }

    #[test]
    fn default_bindings() {
        let bindings = KeyBindings::default().responses();
        assert!(bindings.contains(&(KeyCode::KeyF, ResponseKey::Red)));
        assert!(bindings.contains(&(KeyCode::Numpad1, ResponseKey::Red)));
        assert!(bindings.contains(&(KeyCode::KeyJ, ResponseKey::Green)));
        assert!(bindings.contains(&(KeyCode::Digit2, ResponseKey::Green)));
        assert_eq!(bindings.len(), 6);
    }

    #[test]
    fn partial_file() {
        let cfg: AppConfig = serde_json::from_str(
            r#"{
                "client": {"base_url": "https://lab.example"},
                "keys": {"red": ["D"]},
                "experiment": {"countdown_from": 5},
                "fullscreen": false
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.client.base_url, "https://lab.example");
        assert_eq!(cfg.keys.responses()[0], (KeyCode::KeyD, ResponseKey::Red));
        assert_eq!(cfg.keys.acknowledge_keys(), vec![KeyCode::Space]);
        assert_eq!(cfg.experiment.countdown_from, 5);
        assert_eq!(cfg.experiment.settle_delay_ms, 500);
        assert_eq!(cfg.check_timeout_interval(), Duration::from_secs(300));
        assert!(!cfg.fullscreen);
        assert_eq!(cfg.audio.start_hz, 1000.0);
    }
}
