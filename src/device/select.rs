//! Preferred output device heuristic.

use super::DeviceInfo;

/// Name fragments that usually identify wireless headphones.
pub const DEFAULT_PREFERRED_KEYWORDS: &[&str] = &[
    "bose",
    "sony",
    "jbl",
    "airpods",
    "bt",
    "bluetooth",
    "kulaklık",
    "kulaklik",
];

/// Picks the first output-capable device whose name contains any keyword.
///
/// Matching is case-insensitive. Returns `None` when nothing matches, in
/// which case callers fall back to the system default output.
///
/// # Example
///
/// ```
/// use speech_jammer::device::{select_output_device, DeviceInfo};
///
/// let devices = vec![DeviceInfo {
///     index: 3,
///     name: "JBL Tune 510BT".to_string(),
///     max_input_channels: 0,
///     max_output_channels: 2,
///     default_sample_rate: 48000,
/// }];
/// let chosen = select_output_device(&devices, &["jbl"]).unwrap();
/// assert_eq!(chosen.index, 3);
/// ```
pub fn select_output_device<'a, S: AsRef<str>>(
    devices: &'a [DeviceInfo],
    keywords: &[S],
) -> Option<&'a DeviceInfo> {
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| k.as_ref().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();

    devices.iter().filter(|d| d.is_output()).find(|device| {
        let name = device.name.to_lowercase();
        keywords.iter().any(|keyword| name.contains(keyword.as_str()))
    })
}
