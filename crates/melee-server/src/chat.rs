// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Chat command parsing and dispatch.
//!
//! The chat platform itself (session, OAuth, websocket) is an external
//! collaborator; commands arrive on an mpsc channel from whatever
//! integration is configured. A chatroom id of zero (or none) means the
//! listener is unset and stays disabled — zero never means "public".
//!
//! Supported commands: `!join`, `!leave`, `!buy <weapon>`,
//! `!focus <name>`, `!unfocus`, `!say <text>`, `!team [id]`.

use std::sync::Arc;

use melee_core::{GameKernel, JoinOptions, WeaponId};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Seconds a `!focus` designation stays valid.
const FOCUS_TTL_SECS: f32 = 10.0;
/// Seconds a `!say` bubble stays visible.
const BUBBLE_TTL_SECS: f32 = 6.0;
/// Character clamp applied to `!say` text.
const BUBBLE_MAX_CHARS: usize = 40;

/// A parsed chat command, attributed to the sending viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Enter (or rejoin) the arena.
    Join {
        /// Viewer name.
        name: String,
        /// Optional avatar reference from the platform.
        profile_pic: Option<String>,
    },
    /// Leave the arena.
    Leave {
        /// Viewer name.
        name: String,
    },
    /// Buy and equip a weapon.
    Buy {
        /// Viewer name.
        name: String,
        /// Catalog weapon.
        weapon: WeaponId,
    },
    /// Focus a preferred target.
    Focus {
        /// Viewer name.
        name: String,
        /// Target agent name.
        target: String,
    },
    /// Clear the focus target.
    Unfocus {
        /// Viewer name.
        name: String,
    },
    /// Show a chat bubble above the agent.
    Say {
        /// Viewer name.
        name: String,
        /// Bubble text, already clamped.
        text: String,
    },
    /// Join a team, or leave it with no argument.
    Team {
        /// Viewer name.
        name: String,
        /// Team id; `None` clears.
        team: Option<String>,
    },
}

/// Parses one chat line into a command. Returns `None` for ordinary
/// chatter, unknown commands, and malformed arguments.
pub fn parse_command(user: &str, message: &str) -> Option<ChatCommand> {
    let user = user.trim();
    if user.is_empty() {
        return None;
    }
    let line = message.trim();
    let rest = line.strip_prefix('!')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let verb = parts.next()?.to_ascii_lowercase();
    let arg = parts.next().map(str::trim).unwrap_or_default();

    let name = user.to_owned();
    match verb.as_str() {
        "join" => Some(ChatCommand::Join {
            name,
            profile_pic: None,
        }),
        "leave" => Some(ChatCommand::Leave { name }),
        "buy" => WeaponId::parse(arg).map(|weapon| ChatCommand::Buy { name, weapon }),
        "focus" => {
            if arg.is_empty() {
                None
            } else {
                Some(ChatCommand::Focus {
                    name,
                    target: arg.to_owned(),
                })
            }
        }
        "unfocus" => Some(ChatCommand::Unfocus { name }),
        "say" => {
            if arg.is_empty() {
                None
            } else {
                Some(ChatCommand::Say {
                    name,
                    text: arg.chars().take(BUBBLE_MAX_CHARS).collect(),
                })
            }
        }
        "team" => Some(ChatCommand::Team {
            name,
            team: if arg.is_empty() {
                None
            } else {
                Some(arg.to_owned())
            },
        }),
        _ => None,
    }
}

/// Applies commands to the kernel until the channel closes.
pub async fn run_dispatcher(kernel: Arc<GameKernel>, mut rx: mpsc::Receiver<ChatCommand>) {
    while let Some(cmd) = rx.recv().await {
        apply(&kernel, cmd);
    }
    info!("chat command channel closed");
}

fn apply(kernel: &GameKernel, cmd: ChatCommand) {
    match cmd {
        ChatCommand::Join { name, profile_pic } => {
            let joined = kernel.add_player(
                &name,
                JoinOptions {
                    profile_pic,
                    team: None,
                },
            );
            if joined.is_none() {
                debug!(%name, "join rejected: arena full");
            }
        }
        ChatCommand::Leave { name } => kernel.remove_player(&name),
        ChatCommand::Buy { name, weapon } => {
            if !kernel.buy_weapon(&name, weapon) {
                debug!(%name, weapon = weapon.name(), "purchase rejected");
            }
        }
        ChatCommand::Focus { name, target } => {
            let _ = kernel.set_focus(&name, &target, FOCUS_TTL_SECS);
        }
        ChatCommand::Unfocus { name } => {
            let _ = kernel.clear_focus(&name);
        }
        ChatCommand::Say { name, text } => {
            let _ = kernel.set_chat_bubble(&name, &text, BUBBLE_TTL_SECS);
        }
        ChatCommand::Team { name, team } => {
            let _ = kernel.set_player_team(&name, team);
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use melee_core::{EventLog, KernelConfig};

    #[test]
    fn plain_chatter_is_ignored() {
        assert_eq!(parse_command("ada", "hello there"), None);
        assert_eq!(parse_command("ada", ""), None);
        assert_eq!(parse_command("", "!join"), None);
    }

    #[test]
    fn join_and_leave_parse() {
        assert_eq!(
            parse_command("ada", "!join"),
            Some(ChatCommand::Join {
                name: "ada".into(),
                profile_pic: None
            })
        );
        assert_eq!(
            parse_command("ada", "  !LEAVE  "),
            Some(ChatCommand::Leave { name: "ada".into() })
        );
    }

    #[test]
    fn buy_requires_a_catalog_weapon() {
        assert_eq!(
            parse_command("ada", "!buy sword"),
            Some(ChatCommand::Buy {
                name: "ada".into(),
                weapon: WeaponId::Sword
            })
        );
        assert_eq!(parse_command("ada", "!buy bazooka"), None);
        assert_eq!(parse_command("ada", "!buy"), None);
    }

    #[test]
    fn focus_needs_a_target() {
        assert_eq!(
            parse_command("ada", "!focus bob"),
            Some(ChatCommand::Focus {
                name: "ada".into(),
                target: "bob".into()
            })
        );
        assert_eq!(parse_command("ada", "!focus"), None);
    }

    #[test]
    fn say_clamps_length() {
        let long = "x".repeat(100);
        let Some(ChatCommand::Say { text, .. }) = parse_command("ada", &format!("!say {long}"))
        else {
            unreachable!("say should parse");
        };
        assert_eq!(text.len(), BUBBLE_MAX_CHARS);
    }

    #[test]
    fn team_with_and_without_argument() {
        assert_eq!(
            parse_command("ada", "!team red"),
            Some(ChatCommand::Team {
                name: "ada".into(),
                team: Some("red".into())
            })
        );
        assert_eq!(
            parse_command("ada", "!team"),
            Some(ChatCommand::Team {
                name: "ada".into(),
                team: None
            })
        );
    }

    #[tokio::test]
    async fn dispatcher_applies_commands() {
        let (log, _log_rx) = EventLog::channel();
        let kernel = GameKernel::new(KernelConfig::default(), Arc::new(log));
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(run_dispatcher(Arc::clone(&kernel), rx));

        tx.send(parse_command("ada", "!join").expect("join"))
            .await
            .expect("send");
        tx.send(parse_command("bob", "!join").expect("join"))
            .await
            .expect("send");
        tx.send(parse_command("ada", "!team red").expect("team"))
            .await
            .expect("send");
        tx.send(parse_command("ada", "!say gl hf").expect("say"))
            .await
            .expect("send");
        drop(tx);
        task.await.expect("dispatcher");

        let state = kernel.get_state();
        assert_eq!(state.player_count, 2);
        let ada = state.players.iter().find(|p| p.name == "ada").expect("ada");
        assert_eq!(ada.team.as_deref(), Some("red"));
    }
}
