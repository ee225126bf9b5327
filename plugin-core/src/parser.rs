use nom::{
    branch::alt,
    bytes::complete::{is_a, is_not, tag},
    character::complete::{alphanumeric1, char, multispace0, multispace1},
    combinator::{all_consuming, map, opt, recognize},
    error::ParseError,
    multi::{many0, many1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    Finish, IResult,
};

pub fn with_target<'a, O, F: 'a, E: ParseError<&'a str>>(
    inner: F,
) -> impl FnMut(&'a str) -> IResult<&'a str, (O, Option<&'a str>), E>
where
    F: FnMut(&'a str) -> IResult<&'a str, O, E>,
{
    pair(inner, opt(target))
}

pub fn target<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    let target_sep = delimited(multispace0, char('>'), multispace1);
    map(tuple((target_sep, word, multispace0)), |(_, n, _)| n)(input)
}

pub fn word<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    recognize(many1(alphanumeric1))(input)
}

/// Anything up to the next whitespace
pub fn arg<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    is_not(" \t\r\n")(input)
}

/// Utility to parse common command prefix
pub fn command_prefix<'a, E: ParseError<&'a str>>(input: &'a str) -> IResult<&'a str, &'a str, E> {
    alt((is_a("&"), is_a("λ"), is_a("$")))(input)
}

/// Parse a single command with an optional target
/// Returns None if the parser fails
pub fn single_command<'input>(
    cmd_name: &'static str,
    input: &'input str,
) -> Option<Option<&'input str>> {
    let cmd = preceded(
        command_prefix::<nom::error::Error<&str>>,
        map(with_target(tag(cmd_name)), |(_, t)| Some(t)),
    );

    all_consuming(terminated(cmd, multispace0))(input)
        .finish()
        .map(|x| x.1)
        .unwrap_or_default()
}

/// Parse a command followed by whitespace separated arguments.
/// Returns None if the input isn't this command, an empty vec if
/// the command was given without arguments.
pub fn command_args<'input>(cmd_name: &'static str, input: &'input str) -> Option<Vec<&'input str>> {
    let cmd = preceded(
        command_prefix::<nom::error::Error<&str>>,
        preceded(tag(cmd_name), many0(preceded(multispace1, arg))),
    );

    all_consuming(terminated(cmd, multispace0))(input)
        .finish()
        .map(|x| x.1)
        .ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_single_command() {
        assert_eq!(
            single_command("coucou", "coucou"),
            None,
            "need the command prefix"
        );

        assert_eq!(
            single_command("coucou", "&other"),
            None,
            "only parses given word"
        );

        assert_eq!(
            single_command("coucou", "&coucou"),
            Some(None),
            "can parse single command"
        );

        assert_eq!(
            single_command("coucou", "$coucou"),
            Some(None),
            "dollar prefix"
        );

        assert_eq!(
            single_command("coucou", "&other > charlie"),
            None,
            "target doesn't impact given word"
        );

        assert_eq!(
            single_command("coucou", "λcoucou > charlie"),
            Some(Some("charlie")),
            "also parses with target"
        );
    }

    #[test]
    fn test_target() {
        // monomorphised version to help type inference
        fn _target(input: &str) -> IResult<&str, &str> {
            target(input)
        }

        assert_eq!(_target("> coucou"), Ok(("", "coucou")), "simple target");
        assert_eq!(_target("  >   coucou  "), Ok(("", "coucou")), "spaces everywhere");
        assert!(_target(">coucou").is_err(), "need a space after the >");
    }

    #[test]
    fn test_command_args() {
        assert_eq!(command_args("track", "track start foo"), None, "need the prefix");
        assert_eq!(command_args("track", "&streams"), None);
        assert_eq!(command_args("track", "&tracker start"), None, "whole word only");
        assert_eq!(command_args("track", "&track"), Some(vec![]));
        assert_eq!(
            command_args("track", "$track start foo,Bar_2 twitch  "),
            Some(vec!["start", "foo,Bar_2", "twitch"])
        );
        assert_eq!(
            command_args("subs", "λsubs   foo"),
            Some(vec!["foo"]),
            "extra spaces between args"
        );
    }
}
