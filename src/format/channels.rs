//! Frame-level channel adaptation.

/// How one input frame maps onto the output layout.
///
/// Computed once per stream so the audio callback only runs [`apply`].
///
/// [`apply`]: ChannelMapping::apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMapping {
    /// Source and target widths are equal.
    Passthrough {
        /// Channels on both sides.
        channels: usize,
    },
    /// One channel duplicated into two.
    MonoToStereo,
    /// Mean of four channels duplicated into two.
    ///
    /// A deliberately lossy downmix, not a weighted stereo mix.
    QuadToStereo,
    /// Positional copy of the overlapping channels, silence elsewhere.
    Generic {
        /// Channels per input frame.
        source: usize,
        /// Channels per output frame.
        target: usize,
    },
}

impl ChannelMapping {
    /// Selects the mapping for a source/target pair.
    pub fn new(source: usize, target: usize) -> Self {
        match (source, target) {
            (s, t) if s == t => Self::Passthrough { channels: s },
            (1, 2) => Self::MonoToStereo,
            (4, 2) => Self::QuadToStereo,
            (source, target) => Self::Generic { source, target },
        }
    }

    /// Channels expected per input frame.
    pub fn source_channels(&self) -> usize {
        match self {
            Self::Passthrough { channels } => *channels,
            Self::MonoToStereo => 1,
            Self::QuadToStereo => 4,
            Self::Generic { source, .. } => *source,
        }
    }

    /// Channels written per output frame.
    pub fn target_channels(&self) -> usize {
        match self {
            Self::Passthrough { channels } => *channels,
            Self::MonoToStereo | Self::QuadToStereo => 2,
            Self::Generic { target, .. } => *target,
        }
    }

    /// Returns `true` for the clean 1:1 case.
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Passthrough { .. })
    }

    /// Writes `input` reshaped into `output`.
    ///
    /// Allocation-free. Every slot of `output` is written; slots the input
    /// cannot supply become silence.
    #[inline]
    pub fn apply(&self, input: &[f32], output: &mut [f32]) {
        match self {
            Self::MonoToStereo if !input.is_empty() => output.fill(input[0]),
            Self::QuadToStereo if input.len() >= 4 => {
                let mean = input[..4].iter().sum::<f32>() / 4.0;
                output.fill(mean);
            }
            _ => {
                let shared = input.len().min(output.len());
                output[..shared].copy_from_slice(&input[..shared]);
                output[shared..].fill(0.0);
            }
        }
    }
}

/// Reshapes one input frame into `target_channels` channels.
///
/// The source width is `input_frame.len()`. Never fails: the result always
/// has exactly `target_channels` samples.
///
/// # Example
///
/// ```
/// use speech_jammer::format::adapt;
///
/// assert_eq!(adapt(&[0.5], 2), vec![0.5, 0.5]);
/// assert_eq!(adapt(&[0.1, 0.2, 0.3], 2), vec![0.1, 0.2]);
/// ```
pub fn adapt(input_frame: &[f32], target_channels: usize) -> Vec<f32> {
    let mut output = vec![0.0; target_channels];
    ChannelMapping::new(input_frame.len(), target_channels).apply(input_frame, &mut output);
    output
}
