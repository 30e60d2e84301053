//! Program options from the metadata stream
//!
//! A compiled program declares free-form metadata as `(key, value)` pairs.
//! The key `"options"` carries bracketed tokens; the ones the hosting core
//! understands are `[nvoices:N]` (requested voice count, `0` meaning "as
//! many as supported") and `[midi:on]` (the program wants note input).
//! Anything else is ignored.

use super::{MetadataVisitor, PatchProgram};

/// Options a program requested through its metadata
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PatchOptions {
    /// Requested voice count; `None` when the program never declared one
    pub voices: Option<u32>,
    /// Whether the program asked for MIDI input
    pub midi: bool,
}

impl PatchOptions {
    /// Read the options of a compiled program
    pub fn of(program: &dyn PatchProgram) -> Self {
        let mut collector = Collector::default();
        program.metadata(&mut collector);
        collector.options
    }

    /// Resolve the effective voice count, capped at `max_voices`
    ///
    /// No declaration means a single implicit voice (filter mode); an
    /// explicit `0` means the maximum supported count.
    pub fn voice_count(&self, max_voices: usize) -> usize {
        match self.voices {
            None => 1,
            Some(0) => max_voices,
            Some(n) => (n as usize).clamp(1, max_voices),
        }
    }

    /// True when the program declared more than one voice
    pub fn is_instrument(&self, max_voices: usize) -> bool {
        self.voice_count(max_voices) > 1
    }
}

#[derive(Default)]
struct Collector {
    options: PatchOptions,
}

impl MetadataVisitor for Collector {
    fn declare(&mut self, key: &str, value: &str) {
        if key == "options" {
            parse_options(value, &mut self.options);
        }
    }
}

/// Parse bracketed tokens out of an options string
fn parse_options(value: &str, options: &mut PatchOptions) {
    let mut rest = value;
    while let Some(start) = rest.find('[') {
        let after = &rest[start + 1..];
        let Some(end) = after.find(']') else {
            break;
        };
        let token = &after[..end];

        match token.split_once(':') {
            Some(("nvoices", n)) => {
                if let Ok(n) = n.trim().parse::<u32>() {
                    options.voices = Some(n);
                }
            }
            Some(("midi", flag)) => {
                options.midi = flag.trim() == "on";
            }
            _ => {}
        }

        rest = &after[end + 1..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(value: &str) -> PatchOptions {
        let mut options = PatchOptions::default();
        parse_options(value, &mut options);
        options
    }

    #[test]
    fn test_parse_nvoices() {
        assert_eq!(parse("[nvoices:8]").voices, Some(8));
        assert_eq!(parse("prefix [nvoices:4] suffix").voices, Some(4));
        assert_eq!(parse("").voices, None);
    }

    #[test]
    fn test_parse_midi_flag() {
        assert!(parse("[midi:on]").midi);
        assert!(!parse("[midi:off]").midi);
        assert!(parse("[nvoices:2][midi:on]").midi);
    }

    #[test]
    fn test_malformed_tokens_ignored() {
        assert_eq!(parse("[nvoices:many]").voices, None);
        assert_eq!(parse("[nvoices").voices, None);
        assert_eq!(parse("[unrelated:thing]").voices, None);
    }

    #[test]
    fn test_voice_count_resolution() {
        assert_eq!(parse("").voice_count(32), 1);
        assert_eq!(parse("[nvoices:4]").voice_count(32), 4);
        // 0 requests the maximum supported count
        assert_eq!(parse("[nvoices:0]").voice_count(32), 32);
        // Requests beyond the cap are clamped
        assert_eq!(parse("[nvoices:100]").voice_count(32), 32);
    }

    #[test]
    fn test_instrument_detection() {
        assert!(!parse("").is_instrument(32));
        assert!(!parse("[nvoices:1]").is_instrument(32));
        assert!(parse("[nvoices:2]").is_instrument(32));
    }
}
