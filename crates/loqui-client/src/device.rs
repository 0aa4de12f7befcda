//! Audio device profiles and stream-config candidates.
//!
//! Bluetooth devices expose very different capabilities depending on the
//! active profile: HFP (telephony) offers one low-rate input channel,
//! A2DP offers stereo output at music rates but no input. We classify a
//! device from its reported default config and derive an ordered list of
//! `(channels, sample_rate)` candidates; the first that opens wins.

/// Bluetooth (or wired) profile classification of an audio device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    /// Hands-free profile: mono, at or below 16 kHz.
    Hfp,
    /// Everything else (A2DP headphones, built-in hardware, USB).
    A2dp,
}

/// Classify a device from its default input configuration.
///
/// A device that reports exactly one input channel at or below 16 kHz is
/// treated as HFP.
#[must_use]
pub fn detect_profile(channels: u16, sample_rate: u32) -> DeviceProfile {
    if channels == 1 && sample_rate <= 16_000 {
        DeviceProfile::Hfp
    } else {
        DeviceProfile::A2dp
    }
}

/// Capture sample-rate candidates for a profile, in preference order.
#[must_use]
pub const fn capture_rate_candidates(profile: DeviceProfile) -> &'static [u32] {
    match profile {
        DeviceProfile::Hfp => &[16_000, 8_000],
        DeviceProfile::A2dp => &[16_000, 48_000, 44_100],
    }
}

/// Playback `(channels, sample_rate)` candidates derived from the device's
/// reported default, most specific first.
#[must_use]
pub fn playback_candidates(default_channels: u16, default_rate: u32) -> Vec<(u16, u32)> {
    let mut candidates = vec![
        (default_channels, default_rate),
        (2, 48_000),
        (2, 44_100),
        (1, 48_000),
        (1, 44_100),
        (1, 16_000),
    ];
    candidates.dedup();
    let mut seen = Vec::new();
    candidates.retain(|c| {
        if seen.contains(c) {
            false
        } else {
            seen.push(*c);
            true
        }
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_low_rate_channel_is_hfp() {
        assert_eq!(detect_profile(1, 8_000), DeviceProfile::Hfp);
        assert_eq!(detect_profile(1, 16_000), DeviceProfile::Hfp);
    }

    #[test]
    fn stereo_or_high_rate_is_a2dp() {
        assert_eq!(detect_profile(2, 16_000), DeviceProfile::A2dp);
        assert_eq!(detect_profile(1, 44_100), DeviceProfile::A2dp);
        assert_eq!(detect_profile(2, 48_000), DeviceProfile::A2dp);
    }

    #[test]
    fn hfp_prefers_native_rate_first() {
        assert_eq!(capture_rate_candidates(DeviceProfile::Hfp), &[16_000, 8_000]);
    }

    #[test]
    fn playback_candidates_start_with_device_default() {
        let candidates = playback_candidates(2, 48_000);
        assert_eq!(candidates[0], (2, 48_000));
        // No duplicates even when the default collides with the fallbacks.
        let mut deduped = candidates.clone();
        deduped.dedup();
        assert_eq!(candidates.len(), deduped.len());
        assert_eq!(candidates.iter().filter(|&&c| c == (2, 48_000)).count(), 1);
    }
}
