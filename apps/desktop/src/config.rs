use std::{collections::HashMap, fs};

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub server_url: String,
    pub canvas_id: u8,
    pub fix_delay_ms: u64,
    pub auto_fix: bool,
    pub cooldown_log_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "wss://pixelplanet.fun/ws".into(),
            canvas_id: 0,
            fix_delay_ms: 2000,
            auto_fix: true,
            cooldown_log_secs: 30,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("canvas.toml") {
        apply_file_config(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("CANVAS_SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = std::env::var("CANVAS_ID") {
        if let Ok(parsed) = v.parse::<u8>() {
            settings.canvas_id = parsed;
        }
    }
    if let Ok(v) = std::env::var("CANVAS_FIX_DELAY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.fix_delay_ms = parsed;
        }
    }
    if let Ok(v) = std::env::var("CANVAS_AUTO_FIX") {
        if let Ok(parsed) = v.parse::<bool>() {
            settings.auto_fix = parsed;
        }
    }
    if let Ok(v) = std::env::var("CANVAS_COOLDOWN_LOG_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.cooldown_log_secs = parsed;
        }
    }

    settings
}

fn apply_file_config(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.get("server_url").and_then(|v| v.as_str()) {
        settings.server_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("canvas_id").and_then(|v| v.as_integer()) {
        if let Ok(parsed) = u8::try_from(v) {
            settings.canvas_id = parsed;
        }
    }
    if let Some(v) = file_cfg.get("fix_delay_ms").and_then(|v| v.as_integer()) {
        if let Ok(parsed) = u64::try_from(v) {
            settings.fix_delay_ms = parsed;
        }
    }
    if let Some(v) = file_cfg.get("auto_fix").and_then(|v| v.as_bool()) {
        settings.auto_fix = v;
    }
    if let Some(v) = file_cfg
        .get("cooldown_log_secs")
        .and_then(|v| v.as_integer())
    {
        if let Ok(parsed) = u64::try_from(v) {
            settings.cooldown_log_secs = parsed;
        }
    }
}
