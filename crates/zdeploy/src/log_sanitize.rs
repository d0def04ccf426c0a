//! Terminal-safe rendering of remote command output.
//!
//! Remote scripts print whatever they like. Before a line reaches stdout or
//! the per-run log file, escape sequences and control characters are
//! stripped, overly long lines are cut, and configured secrets are masked.

const MAX_LINE_CHARS: usize = 4096;
const REDACTED: &str = "********";

#[derive(Clone, Copy)]
enum Escape {
    Start,
    Csi,
    Osc,
    OscEnd,
    String,
    StringEnd,
}

impl Escape {
    /// Advance over one char of an escape sequence. `None` means the
    /// sequence has ended.
    fn step(self, c: char) -> Option<Escape> {
        match self {
            Escape::Start => match c {
                '[' => Some(Escape::Csi),
                ']' => Some(Escape::Osc),
                'P' | 'X' | '^' | '_' => Some(Escape::String),
                _ => None,
            },
            Escape::Csi => (!('@'..='~').contains(&c)).then_some(Escape::Csi),
            Escape::Osc => match c {
                '\x07' => None,
                '\x1b' => Some(Escape::OscEnd),
                _ => Some(Escape::Osc),
            },
            Escape::OscEnd => match c {
                '\\' => None,
                '\x1b' => Some(Escape::OscEnd),
                _ => Some(Escape::Osc),
            },
            Escape::String => match c {
                '\x1b' => Some(Escape::StringEnd),
                _ => Some(Escape::String),
            },
            Escape::StringEnd => match c {
                '\\' => None,
                '\x1b' => Some(Escape::StringEnd),
                _ => Some(Escape::String),
            },
        }
    }
}

pub fn sanitize_log_line(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_LINE_CHARS));
    let mut escape: Option<Escape> = None;
    let mut kept = 0usize;

    for c in input.chars() {
        if let Some(state) = escape {
            escape = state.step(c);
            continue;
        }
        let shown = match c {
            '\x1b' => {
                escape = Some(Escape::Start);
                continue;
            }
            '\r' | '\n' => continue,
            '\t' => ' ',
            c if c.is_control() || is_bidi_control(c) => continue,
            c => c,
        };
        if kept == MAX_LINE_CHARS {
            out.push_str(" ...[truncated]");
            break;
        }
        out.push(shown);
        kept += 1;
    }
    out
}

/// Sanitize `input` and mask every occurrence of a non-empty secret.
pub fn sanitize_remote_line(input: &str, secrets: &[&str]) -> String {
    let mut line = sanitize_log_line(input);
    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        if line.contains(secret) {
            line = line.replace(secret, REDACTED);
        }
    }
    line
}

fn is_bidi_control(c: char) -> bool {
    matches!(c, '\u{061C}' | '\u{200E}' | '\u{200F}')
        || ('\u{202A}'..='\u{202E}').contains(&c)
        || ('\u{2066}'..='\u{2069}').contains(&c)
}
