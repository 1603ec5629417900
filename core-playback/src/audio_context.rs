//! # Audio Context
//!
//! Parses the host's audio-session configuration (a category name plus a
//! list of option names) into a validated [`AudioContext`], checking each
//! option against the platform version it will be applied on.
//!
//! Parsing is pure: nothing here touches the platform audio session. The
//! host applies the result through its own [`SessionControl`] implementation.
//!
//! ```
//! use core_playback::audio_context::{AudioCategory, AudioContext, AudioContextArgs, CategoryOptions, PlatformVersion};
//!
//! let args = AudioContextArgs::new("playback", ["mixWithOthers", "duckOthers"]);
//! let context = AudioContext::from_args(&args, PlatformVersion::ios(17, 0)).unwrap();
//!
//! assert_eq!(context.category, AudioCategory::Playback);
//! assert!(context.options.contains(CategoryOptions::MIX_WITH_OTHERS | CategoryOptions::DUCK_OTHERS));
//! ```
//!
//! [`SessionControl`]: bridge_traits::SessionControl

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

// ============================================================================
// Platform
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformOs {
    Ios,
    TvOs,
}

impl fmt::Display for PlatformOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformOs::Ios => f.write_str("iOS"),
            PlatformOs::TvOs => f.write_str("tvOS"),
        }
    }
}

/// Operating system and version the context will be applied on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformVersion {
    pub os: PlatformOs,
    pub major: u32,
    pub minor: u32,
}

impl PlatformVersion {
    pub fn new(os: PlatformOs, major: u32, minor: u32) -> Self {
        Self { os, major, minor }
    }

    pub fn ios(major: u32, minor: u32) -> Self {
        Self::new(PlatformOs::Ios, major, minor)
    }

    pub fn tvos(major: u32, minor: u32) -> Self {
        Self::new(PlatformOs::TvOs, major, minor)
    }

    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

// ============================================================================
// Category
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AudioCategory {
    Ambient,
    SoloAmbient,
    Playback,
    Record,
    PlayAndRecord,
    MultiRoute,
}

impl AudioCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioCategory::Ambient => "ambient",
            AudioCategory::SoloAmbient => "soloAmbient",
            AudioCategory::Playback => "playback",
            AudioCategory::Record => "record",
            AudioCategory::PlayAndRecord => "playAndRecord",
            AudioCategory::MultiRoute => "multiRoute",
        }
    }
}

impl FromStr for AudioCategory {
    type Err = PlaybackError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ambient" => Ok(AudioCategory::Ambient),
            "soloAmbient" => Ok(AudioCategory::SoloAmbient),
            "playback" => Ok(AudioCategory::Playback),
            "record" => Ok(AudioCategory::Record),
            "playAndRecord" => Ok(AudioCategory::PlayAndRecord),
            "multiRoute" => Ok(AudioCategory::MultiRoute),
            other => Err(PlaybackError::InvalidConfig(format!(
                "Invalid Category {}",
                other
            ))),
        }
    }
}

impl fmt::Display for AudioCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Category Options
// ============================================================================

/// Set of audio-session category options.
///
/// Bit values match the platform's raw option values, so a host can pass
/// [`bits`](Self::bits) straight through.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryOptions(u32);

impl CategoryOptions {
    pub const MIX_WITH_OTHERS: Self = Self(0x1);
    pub const DUCK_OTHERS: Self = Self(0x2);
    pub const ALLOW_BLUETOOTH: Self = Self(0x4);
    pub const DEFAULT_TO_SPEAKER: Self = Self(0x8);
    /// Implies [`MIX_WITH_OTHERS`](Self::MIX_WITH_OTHERS).
    pub const INTERRUPT_SPOKEN_AUDIO_AND_MIX_WITH_OTHERS: Self = Self(0x11);
    pub const ALLOW_BLUETOOTH_A2DP: Self = Self(0x20);
    pub const ALLOW_AIR_PLAY: Self = Self(0x40);
    pub const OVERRIDE_MUTED_MICROPHONE_INTERRUPTION: Self = Self(0x80);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set in `self`.
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Resolve one option name, checking it is available on `platform`.
    pub fn parse(option: &str, platform: PlatformVersion) -> Result<Self> {
        let unavailable = |requirement: &str| -> Result<Self> {
            Err(PlaybackError::InvalidConfig(format!(
                "Category Option {} is {}",
                option, requirement
            )))
        };
        let ios = platform.os == PlatformOs::Ios;

        match option {
            "mixWithOthers" => Ok(Self::MIX_WITH_OTHERS),
            "duckOthers" => Ok(Self::DUCK_OTHERS),
            "interruptSpokenAudioAndMixWithOthers" => {
                Ok(Self::INTERRUPT_SPOKEN_AUDIO_AND_MIX_WITH_OTHERS)
            }
            "allowBluetooth" => {
                if ios || platform.at_least(17, 0) {
                    Ok(Self::ALLOW_BLUETOOTH)
                } else {
                    unavailable("only available on tvOS 17+")
                }
            }
            "allowBluetoothA2DP" => match platform.os {
                PlatformOs::Ios if platform.at_least(10, 0) => Ok(Self::ALLOW_BLUETOOTH_A2DP),
                PlatformOs::Ios => unavailable("only available on iOS 10+"),
                PlatformOs::TvOs if platform.at_least(17, 0) => Ok(Self::ALLOW_BLUETOOTH_A2DP),
                PlatformOs::TvOs => unavailable("only available on tvOS 17+"),
            },
            "allowAirPlay" if ios => {
                if platform.at_least(10, 0) {
                    Ok(Self::ALLOW_AIR_PLAY)
                } else {
                    unavailable("only available on iOS 10+")
                }
            }
            "defaultToSpeaker" => {
                if ios {
                    Ok(Self::DEFAULT_TO_SPEAKER)
                } else {
                    unavailable("unavailable on tvOS")
                }
            }
            "overrideMutedMicrophoneInterruption" => match platform.os {
                PlatformOs::Ios if platform.at_least(14, 5) => {
                    Ok(Self::OVERRIDE_MUTED_MICROPHONE_INTERRUPTION)
                }
                PlatformOs::Ios => unavailable("only available on iOS 14.5+"),
                PlatformOs::TvOs => unavailable("unavailable on tvOS"),
            },
            other => Err(PlaybackError::InvalidConfig(format!(
                "Invalid Category Option {}",
                other
            ))),
        }
    }
}

impl BitOr for CategoryOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CategoryOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl FromIterator<CategoryOptions> for CategoryOptions {
    fn from_iter<I: IntoIterator<Item = CategoryOptions>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), BitOr::bitor)
    }
}

impl fmt::Debug for CategoryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CategoryOptions({:#x})", self.0)
    }
}

// ============================================================================
// Audio Context
// ============================================================================

/// Raw arguments as received from the host. Missing fields are reported as
/// `InvalidConfig` rather than defaulted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioContextArgs {
    pub category: Option<String>,
    pub options: Option<Vec<String>>,
}

impl AudioContextArgs {
    pub fn new<I, S>(category: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            category: Some(category.into()),
            options: Some(options.into_iter().map(Into::into).collect()),
        }
    }
}

/// Validated audio-session category and options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioContext {
    pub category: AudioCategory,
    pub options: CategoryOptions,
}

impl Default for AudioContext {
    fn default() -> Self {
        Self {
            category: AudioCategory::Playback,
            options: CategoryOptions::empty(),
        }
    }
}

impl AudioContext {
    pub fn new(category: AudioCategory, options: CategoryOptions) -> Self {
        Self { category, options }
    }

    /// Validate `args` for `platform`.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::InvalidConfig`] naming the missing field, the unknown
    /// category, or the first unknown or unavailable option.
    pub fn from_args(args: &AudioContextArgs, platform: PlatformVersion) -> Result<Self> {
        let category = args
            .category
            .as_deref()
            .ok_or_else(|| null_value("category"))?
            .parse::<AudioCategory>()?;

        let options = args
            .options
            .as_ref()
            .ok_or_else(|| null_value("options"))?
            .iter()
            .map(|option| CategoryOptions::parse(option, platform))
            .collect::<Result<CategoryOptions>>()?;

        Ok(Self { category, options })
    }

    /// Validate a loosely typed JSON payload. A `category` that is not a
    /// string, or `options` that is not an array of strings, counts as null.
    pub fn from_json(value: &Value, platform: PlatformVersion) -> Result<Self> {
        let category = value
            .get("category")
            .and_then(Value::as_str)
            .map(str::to_owned);

        let options = value
            .get("options")
            .and_then(Value::as_array)
            .and_then(|items| {
                items
                    .iter()
                    .map(|item| item.as_str().map(str::to_owned))
                    .collect::<Option<Vec<_>>>()
            });

        Self::from_args(&AudioContextArgs { category, options }, platform)
    }
}

fn null_value(field: &str) -> PlaybackError {
    PlaybackError::InvalidConfig(format!("Null value received for {}", field))
}
