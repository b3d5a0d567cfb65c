use serde::{Deserialize, Serialize};

/// Sentinel width keeping the source resolution (rounded down to even).
pub const ORIGINAL: &str = "original";

/// Compression parameters as submitted by the upload form.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompressParams {
    pub crf: String,
    pub width: String,
    pub height: String,
    pub start_time: String,
    pub duration: String,
    pub custom_width: String,
    pub custom_height: String,
}

impl Default for CompressParams {
    fn default() -> Self {
        Self {
            crf: "28".into(),
            width: "1280".into(),
            height: "-1".into(),
            start_time: "0".into(),
            duration: String::new(),
            custom_width: String::new(),
            custom_height: String::new(),
        }
    }
}

impl CompressParams {
    /// Set a field by its form name. Unknown names are ignored.
    pub fn set(&mut self, name: &str, value: String) {
        let value = value.trim().to_string();
        match name {
            "crf" => self.crf = value,
            "width" => self.width = value,
            "height" => self.height = value,
            "start_time" => self.start_time = value,
            "duration" => self.duration = value,
            "custom_width" => self.custom_width = value,
            "custom_height" => self.custom_height = value,
            _ => {}
        }
    }

    /// Apply the custom size override and check the values that end up in the filter graph.
    pub fn resolve(&self) -> Result<EncodeParams, String> {
        let crf = self
            .crf
            .parse::<u8>()
            .ok()
            .filter(|crf| *crf <= 51)
            .ok_or_else(|| format!("Invalid quality factor '{}': expected 0-51", self.crf))?;

        let (width, height) = if self.custom_width.is_empty() {
            (self.width.as_str(), self.height.as_str())
        } else if self.custom_height.is_empty() {
            (self.custom_width.as_str(), "-1")
        } else {
            (self.custom_width.as_str(), self.custom_height.as_str())
        };

        let scale = if width == ORIGINAL {
            Scale::Original
        } else {
            let width = parse_dimension(width)?;
            let height = if height.is_empty() {
                -1
            } else {
                parse_dimension(height)?
            };
            Scale::Fixed { width, height }
        };

        Ok(EncodeParams {
            crf,
            scale,
            start_time: non_zero_offset(&self.start_time),
            duration: Some(self.duration.clone()).filter(|d| !d.is_empty()),
        })
    }
}

fn parse_dimension(value: &str) -> Result<i32, String> {
    value
        .parse::<i32>()
        .ok()
        .filter(|v| *v > 0 || *v == -1 || *v == -2)
        .ok_or_else(|| format!("Invalid resolution '{value}'"))
}

fn non_zero_offset(value: &str) -> Option<String> {
    let is_zero = value.is_empty()
        || value.parse::<f64>().is_ok_and(|v| v == 0.0)
        || value.chars().all(|c| matches!(c, '0' | ':' | '.'));
    (!is_zero).then(|| value.to_string())
}

/// Output scaling policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scale {
    /// Keep the source size, rounded down to even dimensions.
    Original,
    /// Lanczos resample to `width:height`; `-1` keeps the aspect ratio.
    Fixed { width: i32, height: i32 },
}

impl Scale {
    pub fn filter(&self) -> String {
        match self {
            Scale::Original => "scale=trunc(iw/2)*2:trunc(ih/2)*2".to_string(),
            Scale::Fixed { width, height } => format!("scale={width}:{height}:flags=lanczos"),
        }
    }
}

/// Validated parameters handed to the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeParams {
    pub crf: u8,
    pub scale: Scale,
    pub start_time: Option<String>,
    pub duration: Option<String>,
}

impl Default for EncodeParams {
    fn default() -> Self {
        Self {
            crf: 28,
            scale: Scale::Fixed {
                width: 1280,
                height: -1,
            },
            start_time: None,
            duration: None,
        }
    }
}
