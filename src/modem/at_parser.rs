//! Hayes AT command-line parser (§4.3).
//!
//! Input is one CR-terminated line with the optional `AT`/`at` prefix already
//! known to be present (the caller strips it after recognizing the line as a
//! command line, see `pipeline::hayes`). Commands chain on a single line
//! (`ATE1Q0V1` is three commands); unknown letters are skipped and reported
//! so the caller can warn without aborting the rest of the line.

use super::settings::{DcdMode, DtrMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtCommand {
    Attach,
    Dial(String),
    Echo(bool),
    Hook(bool),
    Info(u8),
    SpeakerVolume(u8),
    SpeakerMode(u8),
    GoOnline,
    Quiet(bool),
    SetRegister(usize, u8),
    QueryRegister(usize),
    Verbose(bool),
    ResultFilter(u8),
    Reset,
    DcdMode(DcdMode),
    DtrMode(DtrMode),
    FactoryDefaults,
    ViewSettings,
    WriteProfile(u8),
    StoreProfile(u8),
    Escape(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtParseOutcome {
    pub commands: Vec<AtCommand>,
    /// Letters the parser did not recognize, in encounter order.
    pub unknown: Vec<char>,
}

/// Parses the command tail of an AT line (prefix already stripped).
pub fn parse_command_tail(tail: &str) -> AtParseOutcome {
    let chars: Vec<char> = tail.chars().collect();
    let mut commands = Vec::new();
    let mut unknown = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i].to_ascii_uppercase();
        match c {
            'A' => {
                commands.push(AtCommand::Attach);
                i += 1;
            }
            'D' => {
                // Dial-out is explicitly out of scope; still parse the
                // number so the line is consumed, but the modem controller
                // answers ERROR for it (no dial-out capability exists).
                let rest: String = chars[i + 1..].iter().collect();
                commands.push(AtCommand::Dial(rest));
                i = chars.len();
            }
            'E' => {
                let (digit, next) = read_digit(&chars, i + 1, 1);
                commands.push(AtCommand::Echo(digit != 0));
                i = next;
            }
            'H' => {
                let (digit, next) = read_digit(&chars, i + 1, 0);
                commands.push(AtCommand::Hook(digit != 0));
                i = next;
            }
            'I' => {
                let (digit, next) = read_number(&chars, i + 1, 0);
                commands.push(AtCommand::Info(digit));
                i = next;
            }
            'L' => {
                let (digit, next) = read_digit(&chars, i + 1, 0);
                commands.push(AtCommand::SpeakerVolume(digit));
                i = next;
            }
            'M' => {
                let (digit, next) = read_digit(&chars, i + 1, 0);
                commands.push(AtCommand::SpeakerMode(digit));
                i = next;
            }
            'O' => {
                commands.push(AtCommand::GoOnline);
                i += 1;
            }
            'Q' => {
                let (digit, next) = read_digit(&chars, i + 1, 1);
                commands.push(AtCommand::Quiet(digit != 0));
                i = next;
            }
            'S' => {
                let (register, next) = read_number(&chars, i + 1, 0);
                if next < chars.len() && chars[next] == '?' {
                    commands.push(AtCommand::QueryRegister(register as usize));
                    i = next + 1;
                } else if next < chars.len() && chars[next] == '=' {
                    let (value, after) = read_number(&chars, next + 1, 0);
                    commands.push(AtCommand::SetRegister(register as usize, value));
                    i = after;
                } else {
                    commands.push(AtCommand::QueryRegister(register as usize));
                    i = next;
                }
            }
            'V' => {
                let (digit, next) = read_digit(&chars, i + 1, 1);
                commands.push(AtCommand::Verbose(digit != 0));
                i = next;
            }
            'X' => {
                let (digit, next) = read_digit(&chars, i + 1, 4);
                commands.push(AtCommand::ResultFilter(digit.min(4)));
                i = next;
            }
            'Z' => {
                let (_profile, next) = read_number(&chars, i + 1, 0);
                commands.push(AtCommand::Reset);
                i = next;
            }
            '&' => {
                if i + 1 >= chars.len() {
                    unknown.push('&');
                    i += 1;
                    continue;
                }
                let ext = chars[i + 1].to_ascii_uppercase();
                let (digit, next) = read_digit(&chars, i + 2, 0);
                match ext {
                    'C' => commands.push(AtCommand::DcdMode(if digit != 0 {
                        DcdMode::TracksCarrier
                    } else {
                        DcdMode::AlwaysHigh
                    })),
                    'D' => commands.push(AtCommand::DtrMode(match digit {
                        0 => DtrMode::Ignore,
                        1 => DtrMode::ToCommand,
                        3 => DtrMode::Reset,
                        _ => DtrMode::HangUp,
                    })),
                    'F' => commands.push(AtCommand::FactoryDefaults),
                    'V' => commands.push(AtCommand::ViewSettings),
                    'W' => commands.push(AtCommand::WriteProfile(digit)),
                    'S' => commands.push(AtCommand::StoreProfile(digit)),
                    other => unknown.push(other),
                }
                i = next;
            }
            '\\' => {
                if i + 1 < chars.len() {
                    commands.push(AtCommand::Escape(chars[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            ' ' => {
                i += 1;
            }
            other => {
                unknown.push(other);
                i += 1;
            }
        }
    }

    AtParseOutcome { commands, unknown }
}

/// Strips a leading `AT`/`at` prefix, returning the tail if present.
pub fn strip_at_prefix(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.len() >= 2 && trimmed[..2].eq_ignore_ascii_case("at") {
        Some(&trimmed[2..])
    } else {
        None
    }
}

fn read_digit(chars: &[char], start: usize, default: u8) -> (u8, usize) {
    if start < chars.len() {
        if let Some(d) = chars[start].to_digit(10) {
            return (d as u8, start + 1);
        }
    }
    (default, start)
}

fn read_number(chars: &[char], start: usize, default: u8) -> (u8, usize) {
    let mut end = start;
    while end < chars.len() && chars[end].is_ascii_digit() {
        end += 1;
    }
    if end == start {
        return (default, start);
    }
    let text: String = chars[start..end].iter().collect();
    (text.parse().unwrap_or(default), end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_at_prefix_case_insensitively() {
        assert_eq!(strip_at_prefix("ATZ"), Some("Z"));
        assert_eq!(strip_at_prefix("atz"), Some("z"));
        assert_eq!(strip_at_prefix("XYZ"), None);
    }

    #[test]
    fn parses_chained_basic_commands() {
        let outcome = parse_command_tail("E1Q0V1");
        assert_eq!(
            outcome.commands,
            vec![
                AtCommand::Echo(true),
                AtCommand::Quiet(false),
                AtCommand::Verbose(true),
            ]
        );
        assert!(outcome.unknown.is_empty());
    }

    #[test]
    fn parses_register_set_and_query() {
        let outcome = parse_command_tail("S0=2S2?");
        assert_eq!(
            outcome.commands,
            vec![
                AtCommand::SetRegister(0, 2),
                AtCommand::QueryRegister(2),
            ]
        );
    }

    #[test]
    fn parses_extended_ampersand_commands() {
        let outcome = parse_command_tail("&C1&D2");
        assert_eq!(
            outcome.commands,
            vec![
                AtCommand::DcdMode(DcdMode::TracksCarrier),
                AtCommand::DtrMode(DtrMode::HangUp),
            ]
        );
    }

    #[test]
    fn unknown_letters_are_reported_but_do_not_abort_the_line() {
        let outcome = parse_command_tail("ZkV1");
        assert!(outcome.unknown.contains(&'k'));
        assert!(outcome.commands.contains(&AtCommand::Reset));
        assert!(outcome.commands.contains(&AtCommand::Verbose(true)));
    }

    #[test]
    fn dial_consumes_rest_of_line() {
        let outcome = parse_command_tail("D5551234");
        assert_eq!(outcome.commands, vec![AtCommand::Dial("5551234".to_string())]);
    }
}
