//! Line protocol: command grammar and response envelopes.
//!
//! A direct, literal transcription of the grammar table rather than
//! something grounded on the teacher's own (binary, length-prefixed) wire
//! format — only the token-splitting style follows
//! `examples/Zygimantass-slsk-rs`'s preference for small free functions
//! over a parser-combinator crate.

/// A fully parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login {
        user_number: String,
        user_name: String,
    },
    CreateRoom {
        room_name: String,
    },
    CreatePrivateRoom {
        room_name: String,
    },
    JoinRoom {
        room_name: String,
    },
    RoomLeave {
        room_name: String,
    },
    RoomRemoveMember {
        room_name: String,
        user_number: String,
    },
    RoomSetDescription {
        room_name: String,
        description: String,
    },
    RoomGetDescription {
        room_name: String,
    },
    RoomGetMembers {
        room_name: String,
    },
    RoomInspect {
        room_name: String,
    },
    RoomOnWhichNode {
        room_name: String,
    },
    RoomDelete {
        room_name: String,
    },
    RoomSend {
        room_name: String,
        message: String,
    },
    RoomInvite {
        room_name: String,
        user_number: String,
    },
    ListJoinedRooms,
    ListAccessibleRooms,
    GetMyself,
    SetMyDescription {
        description: String,
    },
    SetMyUserName {
        user_name: String,
    },
    LogOut,
}

/// Splits `line` into its first `n` whitespace-separated tokens plus
/// whatever (leading-whitespace-trimmed) text remains. Returns `None` if
/// fewer than `n` tokens are present.
fn take_tokens(line: &str, n: usize) -> Option<(Vec<&str>, &str)> {
    let mut rest = line;
    let mut tokens = Vec::with_capacity(n);
    for _ in 0..n {
        let trimmed = rest.trim_start();
        match trimmed.find(char::is_whitespace) {
            Some(i) => {
                tokens.push(&trimmed[..i]);
                rest = &trimmed[i..];
            }
            None if !trimmed.is_empty() => {
                tokens.push(trimmed);
                rest = "";
            }
            None => return None,
        }
    }
    Some((tokens, rest.trim_start()))
}

/// Parses one line (already stripped of its trailing `\n`) into a `Command`.
/// Returns `None` for anything that doesn't match the grammar — the caller
/// replies `Unknown command !\r\n`.
pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }

    let (head, _) = take_tokens(line, 1)?;
    match head[0] {
        "LOGIN" => {
            let (t, rest) = take_tokens(line, 3)?;
            if !rest.is_empty() {
                return None;
            }
            Some(Command::Login {
                user_number: t[1].to_string(),
                user_name: t[2].to_string(),
            })
        }
        "CREATE" => {
            let (t2, _) = take_tokens(line, 2)?;
            match t2.get(1).copied() {
                Some("ROOM") => {
                    let (t, rest) = take_tokens(line, 3)?;
                    if !rest.is_empty() {
                        return None;
                    }
                    Some(Command::CreateRoom {
                        room_name: t[2].to_string(),
                    })
                }
                Some("PRIVATE") => {
                    let (t, rest) = take_tokens(line, 4)?;
                    if t.get(2).copied() != Some("ROOM") || !rest.is_empty() {
                        return None;
                    }
                    Some(Command::CreatePrivateRoom {
                        room_name: t[3].to_string(),
                    })
                }
                _ => None,
            }
        }
        "JOIN" => {
            let (t, rest) = take_tokens(line, 3)?;
            if t.get(1).copied() != Some("ROOM") || !rest.is_empty() {
                return None;
            }
            Some(Command::JoinRoom {
                room_name: t[2].to_string(),
            })
        }
        "ROOM" => {
            let (head3, _) = take_tokens(line, 3)?;
            let room_name = head3[1].to_string();
            match head3[2] {
                "LEAVE" => Some(Command::RoomLeave { room_name }),
                "INSPECT" => Some(Command::RoomInspect { room_name }),
                "DELETE" => Some(Command::RoomDelete { room_name }),
                "REMOVE" => {
                    let (t, rest) = take_tokens(line, 5)?;
                    if t[3] != "MEMBER" || !rest.is_empty() {
                        return None;
                    }
                    Some(Command::RoomRemoveMember {
                        room_name,
                        user_number: t[4].to_string(),
                    })
                }
                "SET" => {
                    let (t, rest) = take_tokens(line, 5)?;
                    if t[3] != "DESCRIPTION" || t[4] != "TO" || rest.is_empty() {
                        return None;
                    }
                    Some(Command::RoomSetDescription {
                        room_name,
                        description: rest.to_string(),
                    })
                }
                "GET" => {
                    let (t, rest) = take_tokens(line, 4)?;
                    if !rest.is_empty() {
                        return None;
                    }
                    match t[3] {
                        "DESCRIPTION" => Some(Command::RoomGetDescription { room_name }),
                        "MEMBERS" => Some(Command::RoomGetMembers { room_name }),
                        _ => None,
                    }
                }
                "ON" => {
                    let (t, rest) = take_tokens(line, 6)?;
                    if t[3] != "WHICH" || t[4] != "NODE" || t[5] != "?" || !rest.is_empty() {
                        return None;
                    }
                    Some(Command::RoomOnWhichNode { room_name })
                }
                "SEND" => {
                    let (_, rest) = take_tokens(line, 3)?;
                    if rest.is_empty() {
                        return None;
                    }
                    Some(Command::RoomSend {
                        room_name,
                        message: rest.to_string(),
                    })
                }
                "INVITE" => {
                    let (t, rest) = take_tokens(line, 4)?;
                    if !rest.is_empty() {
                        return None;
                    }
                    Some(Command::RoomInvite {
                        room_name,
                        user_number: t[3].to_string(),
                    })
                }
                _ => None,
            }
        }
        "LIST" => {
            let (t, rest) = take_tokens(line, 3)?;
            if !rest.is_empty() {
                return None;
            }
            match (t.get(1).copied(), t.get(2).copied()) {
                (Some("JOINED"), Some("ROOMS")) => Some(Command::ListJoinedRooms),
                (Some("ACCESSIBLE"), Some("ROOMS")) => Some(Command::ListAccessibleRooms),
                _ => None,
            }
        }
        "GET" => {
            let (t, rest) = take_tokens(line, 2)?;
            if t.get(1).copied() != Some("MYSELF") || !rest.is_empty() {
                return None;
            }
            Some(Command::GetMyself)
        }
        "SET" => {
            let (t2, _) = take_tokens(line, 2)?;
            if t2.get(1).copied() != Some("MY") {
                return None;
            }
            let (t3, _) = take_tokens(line, 3)?;
            match t3.get(2).copied() {
                Some("DESCRIPTION") => {
                    let (t, rest) = take_tokens(line, 4)?;
                    if t[3] != "TO" || rest.is_empty() {
                        return None;
                    }
                    Some(Command::SetMyDescription {
                        description: rest.to_string(),
                    })
                }
                Some("USER") => {
                    let (t, rest) = take_tokens(line, 6)?;
                    if t[3] != "NAME" || t[4] != "TO" || !rest.is_empty() {
                        return None;
                    }
                    Some(Command::SetMyUserName {
                        user_name: t[5].to_string(),
                    })
                }
                _ => None,
            }
        }
        "LOG" => {
            let (t, rest) = take_tokens(line, 2)?;
            if t.get(1).copied() != Some("OUT") || !rest.is_empty() {
                return None;
            }
            Some(Command::LogOut)
        }
        _ => None,
    }
}

pub const UNKNOWN_COMMAND: &str = "Unknown command !\r\n";
pub const NOT_LOGGED_IN: &str = "You are not logged in\r\n";

/// Direct reply: `## <text> ##\r\n`.
pub fn direct_reply(text: &str) -> String {
    format!("## {text} ##\r\n")
}

/// Room-scoped reply: `(<room_name>): ## <text> ##\r\n`.
pub fn room_reply(room_name: &str, text: &str) -> String {
    format!("({room_name}): ## {text} ##\r\n")
}

/// Broadcast chat line: `<user_name> (<room_name>): <message>\r\n`.
pub fn chat_line(user_name: &str, room_name: &str, message: &str) -> String {
    format!("{user_name} ({room_name}): {message}\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_login() {
        assert_eq!(
            parse("LOGIN 07812345678 Alice"),
            Some(Command::Login {
                user_number: "07812345678".into(),
                user_name: "Alice".into(),
            })
        );
    }

    #[test]
    fn parses_room_send_with_spaces_in_message() {
        assert_eq!(
            parse("ROOM devs SEND hello   there"),
            Some(Command::RoomSend {
                room_name: "devs".into(),
                message: "hello   there".into(),
            })
        );
    }

    #[test]
    fn parses_room_on_which_node() {
        assert_eq!(
            parse("ROOM devs ON WHICH NODE ?"),
            Some(Command::RoomOnWhichNode {
                room_name: "devs".into(),
            })
        );
    }

    #[test]
    fn parses_set_my_user_name() {
        assert_eq!(
            parse("SET MY USER NAME TO Alicia"),
            Some(Command::SetMyUserName {
                user_name: "Alicia".into(),
            })
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse("DANCE"), None);
        assert_eq!(parse(""), None);
    }

    #[test]
    fn envelopes_match_spec_format() {
        assert_eq!(direct_reply("hi"), "## hi ##\r\n");
        assert_eq!(room_reply("devs", "hi"), "(devs): ## hi ##\r\n");
        assert_eq!(chat_line("Alice", "devs", "hi"), "Alice (devs): hi\r\n");
    }
}
