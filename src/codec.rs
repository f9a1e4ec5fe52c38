use thiserror::Error;

use crate::constants::SAVE_TAG_LEN;
use crate::types::EncounterState;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("no saved data")]
    Empty,
    #[error("save tag mismatch: expected {expected:?}, found {found:?}")]
    TagMismatch { expected: String, found: String },
}

/// Per-field problem found while decoding a blob whose tag matched. Every
/// issue has already been recovered from by falling back to a default.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecodeIssue {
    MissingState { index: usize },
    GarbledState { index: usize, raw: String },
    CoercedState { index: usize, raw: u32 },
    MissingExtra { index: usize },
    GarbledExtra { index: usize, raw: String },
    TrailingTokens { count: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedSave {
    pub states: Vec<EncounterState>,
    pub extras: Vec<Option<i64>>,
    pub issues: Vec<DecodeIssue>,
}

/// Fixed shape of one zone's blob: tag, then one state per encounter, then
/// zone-specific scalars in a fixed order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SaveLayout {
    pub tag: &'static str,
    pub encounter_count: usize,
    pub extra_fields: usize,
}

pub trait SaveCodec: Send + Sync {
    fn version(&self) -> u32;

    fn encode(&self, layout: &SaveLayout, states: &[EncounterState], extras: &[i64]) -> String;

    fn decode(&self, layout: &SaveLayout, raw: Option<&str>) -> Result<DecodedSave, CodecError>;
}

/// Space-separated text blob: `"S K 3 0 2 ..."`. Tag characters may also be
/// written adjacent (`"SK 3 0 2"`) on load.
#[derive(Clone, Copy, Debug, Default)]
pub struct TaggedTextCodec;

impl SaveCodec for TaggedTextCodec {
    fn version(&self) -> u32 {
        1
    }

    fn encode(&self, layout: &SaveLayout, states: &[EncounterState], extras: &[i64]) -> String {
        let mut parts: Vec<String> = layout.tag.chars().map(|c| c.to_string()).collect();
        for index in 0..layout.encounter_count {
            let state = states.get(index).copied().unwrap_or_default();
            parts.push(state.as_raw().to_string());
        }
        for index in 0..layout.extra_fields {
            parts.push(extras.get(index).copied().unwrap_or(0).to_string());
        }
        parts.join(" ")
    }

    fn decode(&self, layout: &SaveLayout, raw: Option<&str>) -> Result<DecodedSave, CodecError> {
        let text = raw.map(str::trim).unwrap_or_default();
        if text.is_empty() {
            return Err(CodecError::Empty);
        }

        let (found_tag, rest) = split_tag(text);
        if found_tag != layout.tag {
            return Err(CodecError::TagMismatch {
                expected: layout.tag.to_string(),
                found: found_tag,
            });
        }

        let mut tokens = rest.split_whitespace();
        let mut issues = Vec::new();
        let mut states = Vec::with_capacity(layout.encounter_count);
        for index in 0..layout.encounter_count {
            let state = match tokens.next() {
                None => {
                    issues.push(DecodeIssue::MissingState { index });
                    EncounterState::NotStarted
                }
                Some(token) => match token.parse::<u32>() {
                    Err(_) => {
                        issues.push(DecodeIssue::GarbledState {
                            index,
                            raw: token.to_string(),
                        });
                        EncounterState::NotStarted
                    }
                    Ok(raw) => match EncounterState::from_raw(raw) {
                        Some(state) if state.is_persistable() => state,
                        _ => {
                            issues.push(DecodeIssue::CoercedState { index, raw });
                            EncounterState::NotStarted
                        }
                    },
                },
            };
            states.push(state);
        }

        let mut extras = Vec::with_capacity(layout.extra_fields);
        for index in 0..layout.extra_fields {
            let value = match tokens.next() {
                None => {
                    issues.push(DecodeIssue::MissingExtra { index });
                    None
                }
                Some(token) => match token.parse::<i64>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        issues.push(DecodeIssue::GarbledExtra {
                            index,
                            raw: token.to_string(),
                        });
                        None
                    }
                },
            };
            extras.push(value);
        }

        let trailing = tokens.count();
        if trailing > 0 {
            issues.push(DecodeIssue::TrailingTokens { count: trailing });
        }

        Ok(DecodedSave {
            states,
            extras,
            issues,
        })
    }
}

/// Reads the first `SAVE_TAG_LEN` non-whitespace characters as the tag.
fn split_tag(text: &str) -> (String, &str) {
    let mut tag = String::new();
    let mut consumed = text.len();
    for (offset, c) in text.char_indices() {
        if tag.chars().count() == SAVE_TAG_LEN {
            consumed = offset;
            break;
        }
        if !c.is_whitespace() {
            tag.push(c);
        }
    }
    (tag, &text[consumed..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EncounterState::*;

    const LAYOUT: SaveLayout = SaveLayout {
        tag: "SK",
        encounter_count: 4,
        extra_fields: 0,
    };

    const WAVES_LAYOUT: SaveLayout = SaveLayout {
        tag: "TC",
        encounter_count: 1,
        extra_fields: 1,
    };

    #[test]
    fn encode_writes_tag_then_states_in_id_order() {
        let codec = TaggedTextCodec;
        let text = codec.encode(&LAYOUT, &[Done, InProgress, Fail, NotStarted], &[]);
        assert_eq!(text, "S K 3 1 2 0");
    }

    #[test]
    fn round_trip_preserves_persistable_states() {
        let codec = TaggedTextCodec;
        let states = [Done, Fail, Special, NotStarted];
        let text = codec.encode(&LAYOUT, &states, &[]);
        let decoded = codec.decode(&LAYOUT, Some(&text)).expect("decodes");
        assert_eq!(decoded.states, states.to_vec());
        assert!(decoded.issues.is_empty());
    }

    #[test]
    fn in_progress_and_out_of_range_values_load_as_not_started() {
        let codec = TaggedTextCodec;
        let decoded = codec
            .decode(&LAYOUT, Some("S K 3 1 5 77"))
            .expect("decodes");
        assert_eq!(decoded.states, vec![Done, NotStarted, NotStarted, NotStarted]);
        assert_eq!(decoded.issues.len(), 3);
    }

    #[test]
    fn adjacent_tag_characters_are_accepted() {
        let codec = TaggedTextCodec;
        let decoded = codec.decode(&LAYOUT, Some("SK 3 3 0 2")).expect("decodes");
        assert_eq!(decoded.states, vec![Done, Done, NotStarted, Fail]);
    }

    #[test]
    fn wrong_tag_and_empty_input_are_rejected() {
        let codec = TaggedTextCodec;
        assert_eq!(codec.decode(&LAYOUT, None), Err(CodecError::Empty));
        assert_eq!(codec.decode(&LAYOUT, Some("   ")), Err(CodecError::Empty));
        assert_eq!(
            codec.decode(&LAYOUT, Some("B D 3 3 3 3")),
            Err(CodecError::TagMismatch {
                expected: "SK".to_string(),
                found: "BD".to_string(),
            })
        );
        assert!(matches!(
            codec.decode(&LAYOUT, Some("S")),
            Err(CodecError::TagMismatch { .. })
        ));
    }

    #[test]
    fn short_and_garbled_lists_fall_back_per_record() {
        let codec = TaggedTextCodec;
        let decoded = codec.decode(&LAYOUT, Some("S K 3 x 2")).expect("decodes");
        assert_eq!(decoded.states, vec![Done, NotStarted, Fail, NotStarted]);
        assert_eq!(
            decoded.issues,
            vec![
                DecodeIssue::GarbledState {
                    index: 1,
                    raw: "x".to_string()
                },
                DecodeIssue::MissingState { index: 3 },
            ]
        );
    }

    #[test]
    fn extra_fields_follow_the_state_block() {
        let codec = TaggedTextCodec;
        assert_eq!(codec.encode(&WAVES_LAYOUT, &[Done], &[14]), "T C 3 14");
        let decoded = codec.decode(&WAVES_LAYOUT, Some("T C 3 14")).expect("decodes");
        assert_eq!(decoded.extras, vec![Some(14)]);

        let decoded = codec.decode(&WAVES_LAYOUT, Some("T C 3")).expect("decodes");
        assert_eq!(decoded.extras, vec![None]);
        assert_eq!(decoded.issues, vec![DecodeIssue::MissingExtra { index: 0 }]);
    }
}
