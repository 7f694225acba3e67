//! Chat command parsing.
//!
//! Commands are whitespace-tokenized; the first token is the command word
//! (`/name` or `/name@botname`), the rest are arguments.

use thiserror::Error;

pub const USAGE_OPTION_SET: &str =
    "Usage: /option_set <option> <value>\nOptions: reply_prob, sticker_prob";

/// A setting that can be changed from chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingOption {
    ReplyProbability,
    StickerProbability,
}

impl SettingOption {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "reply_prob" => Some(Self::ReplyProbability),
            "sticker_prob" => Some(Self::StickerProbability),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ReplyProbability => "reply_prob",
            Self::StickerProbability => "sticker_prob",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ReplyProbability => "Reply probability",
            Self::StickerProbability => "Sticker probability",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Stats,
    SetOption { option: SettingOption, value: f64 },
    /// Some other bot's command, or a typo.
    Unknown(String),
}

/// Rejected command arguments. `Display` is the text shown in chat.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error("{0}")]
    Usage(&'static str),
    #[error("Value must be a number between 0 and 1")]
    OutOfRange(f64),
    #[error("Unknown option. Available: reply_prob, sticker_prob")]
    UnknownOption(String),
    #[error("Only bot admins can change settings.")]
    NotAllowed,
}

/// Parse a `/`-prefixed message. Returns `None` for non-commands.
///
/// `/name@handle` addressed to a handle other than `bot_username` parses as
/// [`Command::Unknown`]. With no known username every suffix is accepted.
pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Result<Command, CommandError>> {
    let mut tokens = text.split_whitespace();
    let head = tokens.next()?.strip_prefix('/')?;
    let (name, target) = match head.split_once('@') {
        Some((name, target)) => (name, Some(target)),
        None => (head, None),
    };
    if let (Some(target), Some(me)) = (target, bot_username)
        && !target.eq_ignore_ascii_case(me.trim_start_matches('@'))
    {
        return Some(Ok(Command::Unknown(head.to_string())));
    }
    let args: Vec<&str> = tokens.collect();

    let parsed = match name {
        "help" => no_args(&args, Command::Help, "Usage: /help"),
        "stats" => no_args(&args, Command::Stats, "Usage: /stats"),
        "option_set" => parse_option_set(&args),
        other => Ok(Command::Unknown(other.to_string())),
    };
    Some(parsed)
}

fn no_args(args: &[&str], command: Command, usage: &'static str) -> Result<Command, CommandError> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(CommandError::Usage(usage))
    }
}

fn parse_option_set(args: &[&str]) -> Result<Command, CommandError> {
    let [name, raw] = args else {
        return Err(CommandError::Usage(USAGE_OPTION_SET));
    };
    let value: f64 = raw
        .parse()
        .map_err(|_| CommandError::Usage(USAGE_OPTION_SET))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(CommandError::OutOfRange(value));
    }
    let option =
        SettingOption::parse(name).ok_or_else(|| CommandError::UnknownOption(name.to_string()))?;
    Ok(Command::SetOption { option, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: Option<&str> = Some("pal_bot");

    fn ok(text: &str) -> Command {
        parse(text, ME).expect("is a command").expect("parses")
    }

    fn err(text: &str) -> CommandError {
        parse(text, ME).expect("is a command").expect_err("rejected")
    }

    #[test]
    fn test_not_a_command() {
        assert!(parse("hello /help", ME).is_none());
        assert!(parse("", ME).is_none());
        assert!(parse("   ", ME).is_none());
    }

    #[test]
    fn test_help_and_stats() {
        assert_eq!(ok("/help"), Command::Help);
        assert_eq!(ok("/stats"), Command::Stats);
        assert_eq!(ok("  /stats  "), Command::Stats);
    }

    #[test]
    fn test_bot_suffix_stripped() {
        assert_eq!(ok("/help@pal_bot"), Command::Help);
        assert_eq!(
            ok("/option_set@pal_bot reply_prob 0.2"),
            Command::SetOption { option: SettingOption::ReplyProbability, value: 0.2 }
        );
    }

    #[test]
    fn test_other_bots_commands_are_unknown() {
        assert_eq!(ok("/help@other_bot"), Command::Unknown("help@other_bot".to_string()));
        assert_eq!(
            ok("/option_set@other_bot reply_prob 0"),
            Command::Unknown("option_set@other_bot".to_string())
        );
        assert_eq!(ok("/stats@PAL_BOT"), Command::Stats);
    }

    #[test]
    fn test_suffix_accepted_without_known_username() {
        assert_eq!(parse("/help@anyone", None), Some(Ok(Command::Help)));
    }

    #[test]
    fn test_extra_args_rejected() {
        assert_eq!(err("/help me"), CommandError::Usage("Usage: /help"));
        assert_eq!(err("/stats now"), CommandError::Usage("Usage: /stats"));
    }

    #[test]
    fn test_option_set_valid() {
        assert_eq!(
            ok("/option_set sticker_prob 0.3"),
            Command::SetOption { option: SettingOption::StickerProbability, value: 0.3 }
        );
        assert_eq!(
            ok("/option_set reply_prob 1"),
            Command::SetOption { option: SettingOption::ReplyProbability, value: 1.0 }
        );
        assert_eq!(
            ok("/option_set reply_prob 0"),
            Command::SetOption { option: SettingOption::ReplyProbability, value: 0.0 }
        );
    }

    #[test]
    fn test_option_set_wrong_arity() {
        assert_eq!(err("/option_set"), CommandError::Usage(USAGE_OPTION_SET));
        assert_eq!(err("/option_set reply_prob"), CommandError::Usage(USAGE_OPTION_SET));
        assert_eq!(err("/option_set reply_prob 0.1 extra"), CommandError::Usage(USAGE_OPTION_SET));
    }

    #[test]
    fn test_option_set_unparseable_value() {
        assert_eq!(err("/option_set reply_prob lots"), CommandError::Usage(USAGE_OPTION_SET));
    }

    #[test]
    fn test_option_set_out_of_range() {
        assert_eq!(err("/option_set reply_prob 1.5"), CommandError::OutOfRange(1.5));
        assert_eq!(err("/option_set reply_prob -0.1"), CommandError::OutOfRange(-0.1));
        assert!(matches!(err("/option_set reply_prob NaN"), CommandError::OutOfRange(_)));
        assert!(matches!(err("/option_set reply_prob inf"), CommandError::OutOfRange(_)));
    }

    #[test]
    fn test_value_checked_before_option_name() {
        assert_eq!(err("/option_set volume 2"), CommandError::OutOfRange(2.0));
        assert_eq!(
            err("/option_set volume 0.5"),
            CommandError::UnknownOption("volume".to_string())
        );
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(ok("/start"), Command::Unknown("start".to_string()));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CommandError::OutOfRange(3.0).to_string(),
            "Value must be a number between 0 and 1"
        );
        assert_eq!(
            CommandError::UnknownOption("x".into()).to_string(),
            "Unknown option. Available: reply_prob, sticker_prob"
        );
        assert_eq!(CommandError::Usage(USAGE_OPTION_SET).to_string(), USAGE_OPTION_SET);
    }
}
