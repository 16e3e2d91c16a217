//! Inbound command and callback parsing.

use crate::db::Scope;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Register { server: bool },
    List { server: bool },
    /// `/ai <subcommand> <message>`; `None` when arguments are missing.
    Ai(Option<AiArgs>),
    /// `/ask <message>`; `None` when the message is missing.
    Ask(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiArgs {
    pub subcommand: String,
    pub message: String,
}

/// Parse a slash command. Returns `None` for anything that is not one of
/// the bot's commands, including plain text.
pub fn parse_command(text: &str) -> Option<Command> {
    let trimmed = text.trim();
    let (head, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (trimmed, ""),
    };
    // `/cmd@botname` addresses a specific bot in groups.
    let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();

    match name.as_str() {
        "/start" | "/help" => Some(Command::Help),
        "/reg" => scope_arg(rest).map(|server| Command::Register { server }),
        "/ls" => scope_arg(rest).map(|server| Command::List { server }),
        "/ai" => {
            let mut words = rest.split_whitespace();
            let args = match (words.next(), words.collect::<Vec<_>>()) {
                (Some(subcommand), message) if !message.is_empty() => Some(AiArgs {
                    subcommand: subcommand.to_string(),
                    message: message.join(" "),
                }),
                _ => None,
            };
            Some(Command::Ai(args))
        }
        "/ask" => {
            let message = rest.split_whitespace().collect::<Vec<_>>().join(" ");
            Some(Command::Ask((!message.is_empty()).then_some(message)))
        }
        _ => None,
    }
}

/// `""` selects the user scope, `"server"` the server scope.
fn scope_arg(rest: &str) -> Option<bool> {
    match rest.to_ascii_lowercase().as_str() {
        "" => Some(false),
        "server" => Some(true),
        _ => None,
    }
}

/// Inline keyboard actions, encoded as `action:id` in button data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAction {
    /// Resume the registration wizard for a pending config.
    Setup(Scope, i64),
    /// Delete a pending config from the registration menu.
    Discard(Scope, i64),
    /// Show the commands of one server.
    ListServer(i64),
    /// Delete a command from a listing.
    Remove(Scope, i64),
}

impl CallbackAction {
    pub fn encode(self) -> String {
        match self {
            Self::Setup(scope, id) => format!("reg_setup_{scope}:{id}"),
            Self::Discard(scope, id) => format!("reg_remove_{scope}:{id}"),
            Self::ListServer(id) => format!("ls_server:{id}"),
            Self::Remove(scope, id) => format!("ls_remove_command:{scope}_{id}"),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        let (action, arg) = data.split_once(':')?;
        match action {
            "reg_setup_user" => Some(Self::Setup(Scope::User, arg.parse().ok()?)),
            "reg_setup_server" => Some(Self::Setup(Scope::Server, arg.parse().ok()?)),
            "reg_remove_user" => Some(Self::Discard(Scope::User, arg.parse().ok()?)),
            "reg_remove_server" => Some(Self::Discard(Scope::Server, arg.parse().ok()?)),
            "ls_server" => Some(Self::ListServer(arg.parse().ok()?)),
            "ls_remove_command" => {
                let (scope, id) = arg.split_once('_')?;
                Some(Self::Remove(Scope::parse(scope)?, id.parse().ok()?))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn help_aliases() {
        assert_eq!(parse_command("/start"), Some(Command::Help));
        assert_eq!(parse_command("/HELP"), Some(Command::Help));
        assert_eq!(parse_command("/help@ask_bot"), Some(Command::Help));
    }

    #[test]
    fn register_and_list_scopes() {
        assert_eq!(parse_command("/reg"), Some(Command::Register { server: false }));
        assert_eq!(
            parse_command("/reg@ask_bot  server "),
            Some(Command::Register { server: true })
        );
        assert_eq!(parse_command("/ls server"), Some(Command::List { server: true }));
        assert_eq!(parse_command("/reg something"), None);
    }

    #[test]
    fn ai_splits_subcommand_and_message() {
        assert_eq!(
            parse_command("/ai summarize  Please   summarize this"),
            Some(Command::Ai(Some(AiArgs {
                subcommand: "summarize".into(),
                message: "Please summarize this".into(),
            })))
        );
        assert_eq!(parse_command("/ai summarize"), Some(Command::Ai(None)));
        assert_eq!(parse_command("/ai"), Some(Command::Ai(None)));
    }

    #[test]
    fn ask_takes_whole_message() {
        assert_eq!(
            parse_command("/ask what is up"),
            Some(Command::Ask(Some("what is up".into())))
        );
        assert_eq!(parse_command("/ask   "), Some(Command::Ask(None)));
    }

    #[test]
    fn plain_text_and_unknown_commands_are_not_commands() {
        assert_eq!(parse_command("summarize"), None);
        assert_eq!(parse_command("/unknown"), None);
        assert_eq!(parse_command("/aix foo bar"), None);
    }

    #[test]
    fn callback_data_round_trips() {
        for action in [
            CallbackAction::Setup(Scope::User, 1),
            CallbackAction::Setup(Scope::Server, 2),
            CallbackAction::Discard(Scope::User, 3),
            CallbackAction::Discard(Scope::Server, 4),
            CallbackAction::ListServer(5),
            CallbackAction::Remove(Scope::User, 6),
            CallbackAction::Remove(Scope::Server, 7),
        ] {
            assert_eq!(CallbackAction::parse(&action.encode()), Some(action));
        }
    }

    #[test]
    fn callback_wire_format_is_stable() {
        assert_eq!(
            CallbackAction::Remove(Scope::Server, 9).encode(),
            "ls_remove_command:server_9"
        );
        assert_eq!(CallbackAction::Setup(Scope::User, 1).encode(), "reg_setup_user:1");
    }

    #[test]
    fn malformed_callbacks_are_rejected() {
        assert_eq!(CallbackAction::parse("reg_setup_user"), None);
        assert_eq!(CallbackAction::parse("reg_setup_user:abc"), None);
        assert_eq!(CallbackAction::parse("ls_remove_command:guild_1"), None);
        assert_eq!(CallbackAction::parse("unknown:1"), None);
    }
}
