//! Stream tuning settings and their serialisation into connection URLs.
//!
//! The streaming service reads frame-delivery, adaptive-rendering and
//! quality-of-service knobs from query parameters on the WebSocket URL. Each
//! defined leaf of [`StreamSettings`] becomes one `group.key=value`
//! parameter; undefined leaves are omitted entirely. Settings are layered
//! with `figment`, so defaults, configuration files and environment
//! variables merge beneath explicitly supplied values.

use std::fmt;
#[cfg(feature = "toml")]
use std::path::Path;

#[cfg(feature = "toml")]
use figment::providers::{Format, Toml};
use figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Url, form_urlencoded};

/// Environment prefix for settings overrides, e.g.
/// `RENDER_STREAM_FRAME_DELIVERY__RATE_LIMITING_ENABLED=true`.
pub const ENV_PREFIX: &str = "RENDER_STREAM_";

/// Errors raised while layering or serialising settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The base or resulting connection URL does not parse.
    #[error("invalid connection url {url}: {source}")]
    InvalidUrl {
        /// Offending URL text.
        url: String,
        /// Parser failure.
        #[source]
        source: url::ParseError,
    },
    /// A decimal setting is `NaN` or infinite.
    #[error("setting {key} must be finite, got {value}")]
    NonFinite {
        /// Query parameter name.
        key: &'static str,
        /// Rejected value.
        value: f64,
    },
    /// Layered configuration could not be extracted.
    #[error("invalid stream settings: {0}")]
    Config(#[source] Box<figment::Error>),
}

impl From<figment::Error> for SettingsError {
    fn from(value: figment::Error) -> Self { Self::Config(Box::new(value)) }
}

/// Frame pacing and loss handling.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameDeliverySettings {
    /// Let the server throttle frames when the client falls behind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limiting_enabled: Option<bool>,
    /// Fraction of lost frames tolerated before throttling kicks in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_loss_threshold: Option<f64>,
    /// Number of frame timings retained for loss detection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_max_size: Option<u32>,
    /// Frame acknowledgement timeout as an ISO-8601 duration (`PT2S`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

/// Server-side image quality adaptation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveRenderingSettings {
    /// Toggle adaptive rendering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Lowest JPEG quality the server may choose.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jpeg_min_quality: Option<u32>,
    /// Highest JPEG quality the server may choose.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jpeg_max_quality: Option<u32>,
    /// Lowest image scale factor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_min_scale: Option<f64>,
    /// Highest image scale factor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_max_scale: Option<f64>,
    /// Number of frames averaged when adapting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_size: Option<u32>,
}

/// Quality-of-service reporting.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityOfServiceSettings {
    /// Number of samples retained for quality reporting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_max_size: Option<u32>,
}

/// All tunables that travel in the connection URL.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// `frame-delivery.*` parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_delivery: Option<FrameDeliverySettings>,
    /// `adaptive-rendering.*` parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adaptive_rendering: Option<AdaptiveRenderingSettings>,
    /// `qos.*` parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_of_service: Option<QualityOfServiceSettings>,
}

/// A single serialisable leaf value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SettingValue<'a> {
    /// Rendered as `on` or `off`.
    Flag(bool),
    /// Rendered as a decimal integer.
    Integer(u32),
    /// Rendered with the shortest decimal representation.
    Decimal(f64),
    /// Rendered verbatim (URL encoding happens later).
    Text(&'a str),
}

impl fmt::Display for SettingValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(true) => f.write_str("on"),
            Self::Flag(false) => f.write_str("off"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Decimal(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

struct Leaves<'a>(Vec<(&'static str, SettingValue<'a>)>);

impl<'a> Leaves<'a> {
    fn push<T>(&mut self, key: &'static str, value: Option<T>, kind: fn(T) -> SettingValue<'a>) {
        if let Some(inner) = value {
            self.0.push((key, kind(inner)));
        }
    }
}

impl StreamSettings {
    /// Return the defined leaves as `(parameter, value)` pairs in
    /// declaration order.
    #[must_use]
    pub fn parameters(&self) -> Vec<(&'static str, SettingValue<'_>)> {
        let mut leaves = Leaves(Vec::new());
        if let Some(frame) = &self.frame_delivery {
            leaves.push(
                "frame-delivery.rate-limit-enabled",
                frame.rate_limiting_enabled,
                SettingValue::Flag,
            );
            leaves.push(
                "frame-delivery.packet-loss-threshold",
                frame.packet_loss_threshold,
                SettingValue::Decimal,
            );
            leaves.push(
                "frame-delivery.history-max-size",
                frame.history_max_size,
                SettingValue::Integer,
            );
            leaves.push(
                "frame-delivery.timeout",
                frame.timeout.as_deref(),
                SettingValue::Text,
            );
        }
        if let Some(adaptive) = &self.adaptive_rendering {
            leaves.push(
                "adaptive-rendering.enabled",
                adaptive.enabled,
                SettingValue::Flag,
            );
            leaves.push(
                "adaptive-rendering.jpeg-min-quality",
                adaptive.jpeg_min_quality,
                SettingValue::Integer,
            );
            leaves.push(
                "adaptive-rendering.jpeg-max-quality",
                adaptive.jpeg_max_quality,
                SettingValue::Integer,
            );
            leaves.push(
                "adaptive-rendering.image-min-scale",
                adaptive.image_min_scale,
                SettingValue::Decimal,
            );
            leaves.push(
                "adaptive-rendering.image-max-scale",
                adaptive.image_max_scale,
                SettingValue::Decimal,
            );
            leaves.push(
                "adaptive-rendering.window-size",
                adaptive.window_size,
                SettingValue::Integer,
            );
        }
        if let Some(qos) = &self.quality_of_service {
            leaves.push(
                "qos.history-max-size",
                qos.history_max_size,
                SettingValue::Integer,
            );
        }
        leaves.0
    }

    /// Layer `self` over `defaults`; values defined in `self` win.
    ///
    /// # Errors
    /// Returns [`SettingsError::Config`] if the merged layers do not
    /// deserialise back into settings.
    pub fn with_defaults(&self, defaults: &Self) -> Result<Self, SettingsError> {
        Figment::from(Serialized::defaults(defaults))
            .merge(Serialized::defaults(self))
            .extract()
            .map_err(SettingsError::from)
    }

    /// Load settings from the environment, layered over `defaults`.
    ///
    /// # Errors
    /// Returns [`SettingsError::Config`] when an override has the wrong type.
    pub fn from_env(defaults: &Self) -> Result<Self, SettingsError> {
        Figment::from(Serialized::defaults(defaults))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(SettingsError::from)
    }

    /// Load settings from a TOML file and the environment, layered over
    /// `defaults`. Environment variables take precedence over the file.
    ///
    /// # Errors
    /// Returns [`SettingsError::Config`] when the file or an override is
    /// malformed.
    #[cfg(feature = "toml")]
    pub fn load(path: &Path, defaults: &Self) -> Result<Self, SettingsError> {
        Figment::from(Serialized::defaults(defaults))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(SettingsError::from)
    }
}

/// Append every defined setting to `url` as a query parameter.
///
/// Existing query parameters and fragments are kept intact. Empty settings
/// return `url` unchanged.
///
/// # Errors
/// Returns [`SettingsError::InvalidUrl`] when `url` is not an absolute URL
/// and [`SettingsError::NonFinite`] for a `NaN` or infinite decimal.
pub fn append_settings_to_url(url: &str, settings: &StreamSettings) -> Result<String, SettingsError> {
    parse_url(url)?;
    let parameters = settings.parameters();
    if parameters.is_empty() {
        return Ok(url.to_owned());
    }
    for &(key, value) in &parameters {
        if let SettingValue::Decimal(decimal) = value
            && !decimal.is_finite()
        {
            return Err(SettingsError::NonFinite { key, value: decimal });
        }
    }

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in &parameters {
        serializer.append_pair(key, &value.to_string());
    }
    let query = serializer.finish();

    let (head, fragment) = url
        .split_once('#')
        .map_or((url, None), |(head, fragment)| (head, Some(fragment)));
    let separator = if !head.contains('?') {
        "?"
    } else if head.ends_with('?') || head.ends_with('&') {
        ""
    } else {
        "&"
    };
    let mut augmented = format!("{head}{separator}{query}");
    if let Some(fragment) = fragment {
        augmented.push('#');
        augmented.push_str(fragment);
    }
    parse_url(&augmented)?;
    Ok(augmented)
}

fn parse_url(url: &str) -> Result<Url, SettingsError> {
    Url::parse(url).map_err(|source| SettingsError::InvalidUrl {
        url: url.to_owned(),
        source,
    })
}
