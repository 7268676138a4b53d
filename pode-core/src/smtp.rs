//! A minimal RFC 5321 command dialog: enough to accept mail, not a full
//! transfer agent. Grounded on the teacher's `registry.rs`, whose
//! `CanProcess`-gated state machine this mirrors — a small enum of states
//! plus a single dispatch point that rejects commands out of sequence.

use crate::error::{PodeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Greeted,
    Helo,
    MailFrom,
    RcptTo,
    Data,
}

#[derive(Debug, Clone, Default)]
pub struct Envelope {
    pub helo_domain: String,
    pub mail_from: String,
    pub rcpt_to: Vec<String>,
    pub data: Vec<u8>,
}

/// A line of output the caller should write back to the client.
pub struct Reply {
    pub code: u16,
    pub text: String,
}

impl Reply {
    fn new(code: u16, text: impl Into<String>) -> Self {
        Self { code, text: text.into() }
    }

    pub fn to_line(&self) -> String {
        format!("{} {}\r\n", self.code, self.text)
    }
}

/// Outcome of feeding one command line into the dialog.
pub enum Outcome {
    Reply(Reply),
    /// The `DATA` command's body has been fully received (terminated by a
    /// bare `.` line) and the envelope is ready to hand to a handler.
    MessageReady(Envelope),
    CloseConnection(Reply),
}

/// Drives one SMTP connection's command sequence. `CanProcess` and friends
/// in the teacher's registry reset to a known-good state on `RSET`; this
/// does the same, folding back to `Helo`.
pub struct Dialog {
    state: State,
    envelope: Envelope,
    in_data: bool,
    data_buffer: Vec<u8>,
}

impl Dialog {
    pub fn new() -> Self {
        Self {
            state: State::Greeted,
            envelope: Envelope::default(),
            in_data: false,
            data_buffer: Vec::new(),
        }
    }

    pub fn greeting(hostname: &str) -> Reply {
        Reply::new(220, format!("{hostname} Pode SMTP ready"))
    }

    /// Feeds one line (without its trailing CRLF) into the dialog.
    pub fn feed_line(&mut self, line: &str) -> Result<Outcome> {
        if self.in_data {
            return Ok(self.feed_data_line(line));
        }

        let mut parts = line.splitn(2, ' ');
        let verb = parts.next().unwrap_or("").to_ascii_uppercase();
        let rest = parts.next().unwrap_or("").trim();

        match verb.as_str() {
            "HELO" | "EHLO" => {
                if rest.is_empty() {
                    return Ok(Outcome::Reply(Reply::new(501, "syntax: HELO domain")));
                }
                self.envelope.helo_domain = rest.to_string();
                self.state = State::Helo;
                Ok(Outcome::Reply(Reply::new(250, format!("Hello {rest}"))))
            }
            "MAIL" => {
                if self.state < State::Helo {
                    return Ok(Outcome::Reply(Reply::new(503, "send HELO/EHLO first")));
                }
                let addr = extract_angle_addr(rest)
                    .ok_or_else(|| PodeError::ProtocolParse("malformed MAIL FROM".into()))?;
                self.envelope.mail_from = addr;
                self.envelope.rcpt_to.clear();
                self.state = State::MailFrom;
                Ok(Outcome::Reply(Reply::new(250, "OK")))
            }
            "RCPT" => {
                if self.state < State::MailFrom {
                    return Ok(Outcome::Reply(Reply::new(503, "send MAIL FROM first")));
                }
                let addr = extract_angle_addr(rest)
                    .ok_or_else(|| PodeError::ProtocolParse("malformed RCPT TO".into()))?;
                self.envelope.rcpt_to.push(addr);
                self.state = State::RcptTo;
                Ok(Outcome::Reply(Reply::new(250, "OK")))
            }
            "DATA" => {
                if self.state < State::RcptTo {
                    return Ok(Outcome::Reply(Reply::new(503, "send RCPT TO first")));
                }
                self.state = State::Data;
                self.in_data = true;
                self.data_buffer.clear();
                Ok(Outcome::Reply(Reply::new(354, "Start mail input; end with <CRLF>.<CRLF>")))
            }
            "RSET" => {
                self.reset_to_helo();
                Ok(Outcome::Reply(Reply::new(250, "OK")))
            }
            "NOOP" => Ok(Outcome::Reply(Reply::new(250, "OK"))),
            "QUIT" => Ok(Outcome::CloseConnection(Reply::new(221, "Bye"))),
            other => Ok(Outcome::Reply(Reply::new(500, format!("unrecognized command: {other}")))),
        }
    }

    fn feed_data_line(&mut self, line: &str) -> Outcome {
        if line == "." {
            self.in_data = false;
            let envelope = std::mem::take(&mut self.envelope);
            self.reset_to_helo();
            return Outcome::MessageReady(Envelope {
                data: std::mem::take(&mut self.data_buffer),
                ..envelope
            });
        }
        let unescaped = line.strip_prefix("..").map(|rest| format!(".{rest}"));
        let line = unescaped.as_deref().unwrap_or(line);
        self.data_buffer.extend_from_slice(line.as_bytes());
        self.data_buffer.extend_from_slice(b"\r\n");
        Outcome::Reply(Reply::new(0, String::new()))
    }

    fn reset_to_helo(&mut self) {
        let helo_domain = self.envelope.helo_domain.clone();
        self.envelope = Envelope {
            helo_domain,
            ..Envelope::default()
        };
        self.state = if self.envelope.helo_domain.is_empty() {
            State::Greeted
        } else {
            State::Helo
        };
        self.in_data = false;
        self.data_buffer.clear();
    }
}

impl Default for Dialog {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        fn rank(s: &State) -> u8 {
            match s {
                State::Greeted => 0,
                State::Helo => 1,
                State::MailFrom => 2,
                State::RcptTo => 3,
                State::Data => 4,
            }
        }
        rank(self).cmp(&rank(other))
    }
}

fn extract_angle_addr(rest: &str) -> Option<String> {
    let verb_arg = rest.splitn(2, ':').nth(1)?.trim();
    let inner = verb_arg.strip_prefix('<')?.strip_suffix('>')?;
    Some(inner.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_code(outcome: Outcome) -> u16 {
        match outcome {
            Outcome::Reply(r) => r.code,
            Outcome::CloseConnection(r) => r.code,
            Outcome::MessageReady(_) => panic!("expected a reply"),
        }
    }

    #[test]
    fn rejects_mail_from_before_helo() {
        let mut dialog = Dialog::new();
        let outcome = dialog.feed_line("MAIL FROM:<a@b.com>").unwrap();
        assert_eq!(reply_code(outcome), 503);
    }

    #[test]
    fn accepts_a_full_dialog_and_completes_data() {
        let mut dialog = Dialog::new();
        assert_eq!(reply_code(dialog.feed_line("EHLO client.example").unwrap()), 250);
        assert_eq!(reply_code(dialog.feed_line("MAIL FROM:<a@b.com>").unwrap()), 250);
        assert_eq!(reply_code(dialog.feed_line("RCPT TO:<c@d.com>").unwrap()), 250);
        assert_eq!(reply_code(dialog.feed_line("DATA").unwrap()), 354);

        dialog.feed_line("Subject: hi").unwrap();
        dialog.feed_line("").unwrap();
        dialog.feed_line("body text").unwrap();
        match dialog.feed_line(".").unwrap() {
            Outcome::MessageReady(envelope) => {
                assert_eq!(envelope.mail_from, "a@b.com");
                assert_eq!(envelope.rcpt_to, vec!["c@d.com".to_string()]);
                assert!(String::from_utf8(envelope.data).unwrap().contains("body text"));
            }
            _ => panic!("expected message ready"),
        }
    }

    #[test]
    fn rset_returns_to_helo_state_not_greeted() {
        let mut dialog = Dialog::new();
        dialog.feed_line("HELO client.example").unwrap();
        dialog.feed_line("MAIL FROM:<a@b.com>").unwrap();
        dialog.feed_line("RSET").unwrap();

        // MAIL should work immediately after RSET since HELO was already given.
        assert_eq!(reply_code(dialog.feed_line("MAIL FROM:<x@y.com>").unwrap()), 250);
    }

    #[test]
    fn quit_closes_the_connection() {
        let mut dialog = Dialog::new();
        assert!(matches!(dialog.feed_line("QUIT").unwrap(), Outcome::CloseConnection(_)));
    }
}
