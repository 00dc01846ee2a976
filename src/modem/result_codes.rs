//! Result-code taxonomy and formatting (§4.3.2).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemResultCode {
    Ok,
    Connect(Option<u32>),
    Ring,
    NoCarrier,
    Error,
    NoDialtone,
    Busy,
    NoAnswer,
    /// Non-standard extensions present in the Hayes dictionary (§4.5.2) but
    /// without a numeric V0 code of their own; always rendered verbosely.
    Delayed,
    Blacklisted,
}

impl ModemResultCode {
    /// `ends_command_mode` per §4.5.2: CONNECT is the only result that flips
    /// the filter into ONLINE mode.
    pub fn ends_command_mode(self) -> bool {
        matches!(self, ModemResultCode::Connect(_))
    }

    fn numeric_code(self) -> Option<u8> {
        match self {
            ModemResultCode::Ok => Some(0),
            ModemResultCode::Connect(_) => Some(1),
            ModemResultCode::Ring => Some(2),
            ModemResultCode::NoCarrier => Some(3),
            ModemResultCode::Error => Some(4),
            ModemResultCode::NoDialtone => Some(6),
            ModemResultCode::Busy => Some(7),
            ModemResultCode::NoAnswer => Some(8),
            ModemResultCode::Delayed | ModemResultCode::Blacklisted => None,
        }
    }

    fn verbose_text(self) -> String {
        match self {
            ModemResultCode::Ok => "OK".to_string(),
            ModemResultCode::Connect(Some(speed)) => format!("CONNECT {}", speed),
            ModemResultCode::Connect(None) => "CONNECT".to_string(),
            ModemResultCode::Ring => "RING".to_string(),
            ModemResultCode::NoCarrier => "NO CARRIER".to_string(),
            ModemResultCode::Error => "ERROR".to_string(),
            ModemResultCode::NoDialtone => "NO DIALTONE".to_string(),
            ModemResultCode::Busy => "BUSY".to_string(),
            ModemResultCode::NoAnswer => "NO ANSWER".to_string(),
            ModemResultCode::Delayed => "DELAYED".to_string(),
            ModemResultCode::Blacklisted => "BLACKLISTED".to_string(),
        }
    }

    /// Apply the `Xn` filter (§4.3.2): collapses a subset of results down to
    /// NO CARRIER depending on how much the caller wants to distinguish
    /// dial-failure causes.
    pub fn apply_x_filter(self, x: u8) -> Self {
        use ModemResultCode::*;
        match (x, self) {
            (0, NoDialtone | Busy | NoAnswer) => NoCarrier,
            (2, Busy | NoAnswer) => NoCarrier,
            (3, NoDialtone | NoAnswer) => NoCarrier,
            _ => self,
        }
    }

    /// Render per the active `V`/`Q` settings. `Q1` suppresses everything.
    pub fn format(self, verbose: bool, quiet: bool) -> String {
        if quiet {
            return String::new();
        }
        if verbose {
            format!("\r\n{}\r\n", self.verbose_text())
        } else {
            match self.numeric_code() {
                Some(code) => format!("{}\r\n", code),
                // Extensions with no numeric form fall back to verbose text
                // even under V0, since there is nothing else to send.
                None => format!("\r\n{}\r\n", self.verbose_text()),
            }
        }
    }
}

impl fmt::Display for ModemResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verbose_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_suppresses_all_output() {
        assert_eq!(ModemResultCode::Ok.format(true, true), "");
        assert_eq!(ModemResultCode::Error.format(false, true), "");
    }

    #[test]
    fn verbose_wraps_in_crlf() {
        assert_eq!(ModemResultCode::Ok.format(true, false), "\r\nOK\r\n");
        assert_eq!(
            ModemResultCode::Connect(Some(2400)).format(true, false),
            "\r\nCONNECT 2400\r\n"
        );
    }

    #[test]
    fn numeric_mode_emits_digits() {
        assert_eq!(ModemResultCode::Ok.format(false, false), "0\r\n");
        assert_eq!(ModemResultCode::Busy.format(false, false), "7\r\n");
    }

    #[test]
    fn x0_collapses_dial_failures_to_no_carrier() {
        assert_eq!(ModemResultCode::Busy.apply_x_filter(0), ModemResultCode::NoCarrier);
        assert_eq!(ModemResultCode::NoDialtone.apply_x_filter(0), ModemResultCode::NoCarrier);
        assert_eq!(ModemResultCode::NoAnswer.apply_x_filter(0), ModemResultCode::NoCarrier);
    }

    #[test]
    fn x1_is_a_passthrough() {
        assert_eq!(ModemResultCode::Busy.apply_x_filter(1), ModemResultCode::Busy);
    }

    #[test]
    fn x4_passes_every_result_unfiltered() {
        for code in [
            ModemResultCode::NoDialtone,
            ModemResultCode::Busy,
            ModemResultCode::NoAnswer,
        ] {
            assert_eq!(code.apply_x_filter(4), code);
        }
    }

    #[test]
    fn connect_ends_command_mode_and_nothing_else_does() {
        assert!(ModemResultCode::Connect(None).ends_command_mode());
        assert!(!ModemResultCode::Ok.ends_command_mode());
        assert!(!ModemResultCode::Ring.ends_command_mode());
    }
}
