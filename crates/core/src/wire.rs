//! Control-channel line tokenizer: turns one UDP datagram's text line
//! into a [`UlCommand`], mirroring the original wire layout where the
//! opcode word carries its modifier letters and the notify-socket/tag
//! pair only appears when the argument count says it's there.
//!
//! Wire layout (space-separated, after a leading cookie word echoed
//! back unchanged in the reply):
//!
//! ```text
//! <cookie> <opcode+modifiers> <call-id> <addr> <port> <from-tag> [<to-tag>] [<notify-socket> <notify-tag>]
//! ```
//!
//! 4 fields after the opcode: no to-tag, no notify. 5 fields: to-tag
//! only. 6 fields: notify present, no to-tag. 7 fields: to-tag and
//! notify both present.

use crate::command::{CommandOp, UlCommand};
use crate::error::{ParseErrorKind, RtpProxyError};

pub struct ParsedLine {
    pub cookie: String,
    pub command: UlCommand,
}

pub fn parse_line(line: &str) -> Result<ParsedLine, RtpProxyError> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.len() < 2 {
        return Err(RtpProxyError::Parse {
            kind: ParseErrorKind::ShortCommand,
        });
    }
    let cookie = words[0].to_string();
    let rest = &words[1..];

    let opcode_word = rest[0];
    let mut chars = opcode_word.chars();
    let opcode = chars.next().ok_or(RtpProxyError::Parse {
        kind: ParseErrorKind::ShortCommand,
    })?;
    let op = match opcode.to_ascii_uppercase() {
        'U' => CommandOp::Update,
        'L' => CommandOp::Lookup,
        _ => {
            return Err(RtpProxyError::Parse {
                kind: ParseErrorKind::BadSubcommand,
            });
        }
    };
    let modifiers: String = chars.collect();

    let args = &rest[1..];
    if args.len() < 4 {
        return Err(RtpProxyError::Parse {
            kind: ParseErrorKind::ShortCommand,
        });
    }
    let call_id = args[0].to_string();
    let addr = args[1].to_string();
    let port = args[2].to_string();
    let from_tag = args[3].to_string();

    let (to_tag, notify) = match args.len() {
        4 => (None, None),
        5 => (Some(args[4].to_string()), None),
        6 => (None, Some((args[4].to_string(), args[5].to_string()))),
        7 => (
            Some(args[4].to_string()),
            Some((args[5].to_string(), args[6].to_string())),
        ),
        _ => {
            return Err(RtpProxyError::Parse {
                kind: ParseErrorKind::ShortCommand,
            });
        }
    };

    Ok(ParsedLine {
        cookie,
        command: UlCommand {
            op,
            call_id,
            from_tag,
            to_tag,
            modifiers,
            addr: Some(addr),
            port: Some(port),
            notify,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_update_parses() {
        let parsed = parse_line("123 Uw callid1 1.2.3.4 5000 fromtag1").unwrap();
        assert_eq!(parsed.cookie, "123");
        assert_eq!(parsed.command.op, CommandOp::Update);
        assert_eq!(parsed.command.modifiers, "w");
        assert_eq!(parsed.command.call_id, "callid1");
        assert_eq!(parsed.command.to_tag, None);
        assert!(parsed.command.notify.is_none());
    }

    #[test]
    fn with_to_tag_only() {
        let parsed = parse_line("1 U callid1 1.2.3.4 5000 fromtag1 totag1").unwrap();
        assert_eq!(parsed.command.to_tag.as_deref(), Some("totag1"));
        assert!(parsed.command.notify.is_none());
    }

    #[test]
    fn with_notify_only_no_to_tag() {
        let parsed = parse_line("1 U callid1 1.2.3.4 5000 fromtag1 udp:1.2.3.4:9 tag9").unwrap();
        assert_eq!(parsed.command.to_tag, None);
        assert_eq!(
            parsed.command.notify,
            Some(("udp:1.2.3.4:9".to_string(), "tag9".to_string()))
        );
    }

    #[test]
    fn with_to_tag_and_notify() {
        let parsed =
            parse_line("1 U callid1 1.2.3.4 5000 fromtag1 totag1 udp:1.2.3.4:9 tag9").unwrap();
        assert_eq!(parsed.command.to_tag.as_deref(), Some("totag1"));
        assert!(parsed.command.notify.is_some());
    }

    #[test]
    fn lookup_opcode_recognized() {
        let parsed = parse_line("1 L callid1 1.2.3.4 5000 fromtag1").unwrap();
        assert_eq!(parsed.command.op, CommandOp::Lookup);
    }

    #[test]
    fn too_few_fields_rejected() {
        assert!(parse_line("1 U callid1").is_err());
    }

    #[test]
    fn unknown_opcode_rejected() {
        assert!(parse_line("1 X callid1 1.2.3.4 5000 fromtag1").is_err());
    }
}
