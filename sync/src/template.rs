//! The user-configured channel title template.
//!
//! Placeholders are `{title}`, `{game}` and `{artist}`; `{{` and `}}` produce literal braces.
//! Templates are parsed once at startup so that typos surface before the poll loop starts.

use std::fmt;
use std::str::FromStr;

/// Longest title Twitch accepts for a channel.
pub const MAX_TITLE_CHARS: usize = 140;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Game,
    Artist,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "title" => Some(Self::Title),
            "game" => Some(Self::Game),
            "artist" => Some(Self::Artist),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder `{{{name}}}` at byte {offset} (expected title, game or artist)")]
    UnknownPlaceholder { name: String, offset: usize },
    #[error("placeholder opened at byte {offset} is never closed")]
    Unclosed { offset: usize },
    #[error("unmatched `}}` at byte {offset} (write `}}}}` for a literal brace)")]
    UnmatchedClose { offset: usize },
    #[error("title template is empty")]
    Empty,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("rendered title is empty")]
    Empty,
    #[error("rendered title is {chars} characters long, Twitch allows at most {max}", max = MAX_TITLE_CHARS)]
    TooLong { chars: usize },
}

/// The values a template can refer to.
#[derive(Debug, Clone, Copy, Default)]
pub struct TitleFields<'a> {
    pub title: &'a str,
    pub game: &'a str,
    pub artist: &'a str,
}

/// A parsed title template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleTemplate {
    segments: Vec<Segment>,
}

impl FromStr for TitleTemplate {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = s.char_indices().peekable();

        while let Some((offset, c)) = chars.next() {
            match c {
                '{' if chars.next_if(|&(_, c)| c == '{').is_some() => literal.push('{'),
                '}' if chars.next_if(|&(_, c)| c == '}').is_some() => literal.push('}'),
                '}' => return Err(TemplateError::UnmatchedClose { offset }),
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some((_, '}')) => break,
                            Some((_, c)) => name.push(c),
                            None => return Err(TemplateError::Unclosed { offset }),
                        }
                    }
                    let name = name.trim();
                    let field = Field::from_name(name).ok_or_else(|| {
                        TemplateError::UnknownPlaceholder {
                            name: name.to_string(),
                            offset,
                        }
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if segments.is_empty() {
            return Err(TemplateError::Empty);
        }
        Ok(Self { segments })
    }
}

impl TitleTemplate {
    /// Fills in the placeholders.
    ///
    /// Surrounding whitespace is trimmed; the result must be non-empty and fit Twitch's limit.
    pub fn render(&self, fields: &TitleFields<'_>) -> Result<String, RenderError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Field(Field::Title) => out.push_str(fields.title),
                Segment::Field(Field::Game) => out.push_str(fields.game),
                Segment::Field(Field::Artist) => out.push_str(fields.artist),
            }
        }

        let out = out.trim();
        if out.is_empty() {
            return Err(RenderError::Empty);
        }
        let chars = out.chars().count();
        if chars > MAX_TITLE_CHARS {
            return Err(RenderError::TooLong { chars });
        }
        Ok(out.to_string())
    }
}

impl fmt::Display for TitleTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => write!(f, "{}", s.replace('{', "{{").replace('}', "}}"))?,
                Segment::Field(Field::Title) => f.write_str("{title}")?,
                Segment::Field(Field::Game) => f.write_str("{game}")?,
                Segment::Field(Field::Artist) => f.write_str("{artist}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;

    fn render(template: &str, title: &str, game: &str) -> Result<String, RenderError> {
        template.parse::<TitleTemplate>().unwrap().render(&TitleFields {
            title,
            game,
            artist: "",
        })
    }

    #[test]
    fn substitutes_placeholders() {
        assert_eq!(
            render("🎵 {title} ({game})", "Song A", "Game A").unwrap(),
            "🎵 Song A (Game A)"
        );
        assert_eq!(
            render("{ title } / { game }", "Song A", "Game A").unwrap(),
            "Song A / Game A"
        );
    }

    #[test]
    fn artist_placeholder() {
        let template: TitleTemplate = "{artist} - {title}".parse().unwrap();
        let title = template
            .render(&TitleFields {
                title: "Song",
                game: "",
                artist: "Band",
            })
            .unwrap();
        assert_eq!(title, "Band - Song");
    }

    #[test]
    fn escaped_braces() {
        assert_eq!(
            render("{{live}} {title} }}", "Song", "").unwrap(),
            "{live} Song }"
        );
    }

    #[test]
    fn display_round_trips() {
        let template: TitleTemplate = "{{x}} {title} from {game}".parse().unwrap();
        assert_eq!(template.to_string(), "{{x}} {title} from {game}");
        assert_eq!(template.to_string().parse::<TitleTemplate>().unwrap(), template);
    }

    #[test]
    fn parse_errors() {
        assert_snapshot!(
            "{title} {album}".parse::<TitleTemplate>().unwrap_err(),
            @"unknown placeholder `{album}` at byte 8 (expected title, game or artist)"
        );
        assert_snapshot!(
            "Now playing {title".parse::<TitleTemplate>().unwrap_err(),
            @"placeholder opened at byte 12 is never closed"
        );
        assert_snapshot!(
            "oops } {title}".parse::<TitleTemplate>().unwrap_err(),
            @"unmatched `}` at byte 5 (write `}}` for a literal brace)"
        );
        assert_eq!("".parse::<TitleTemplate>(), Err(TemplateError::Empty));
    }

    #[test]
    fn empty_render_is_an_error() {
        assert_eq!(render("  {game}  ", "Song", ""), Err(RenderError::Empty));
    }

    #[test]
    fn long_render_is_an_error() {
        let title = "x".repeat(MAX_TITLE_CHARS);
        assert_eq!(render("{title}", &title, "").unwrap().len(), MAX_TITLE_CHARS);
        assert_eq!(
            render("> {title}", &title, ""),
            Err(RenderError::TooLong {
                chars: MAX_TITLE_CHARS + 2
            })
        );
    }
}
