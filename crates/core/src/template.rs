use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),
    Token(Token),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Year,
    Month,
    Day,
    Event,
    File,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("テンプレートが空です")]
    Empty,
    #[error("中括弧の対応が不正です")]
    UnbalancedBraces,
    #[error("未対応トークンです: {0}")]
    UnknownToken(String),
    #[error("テンプレートに {{event}} が含まれていません")]
    MissingEvent,
    #[error("照合パターンを生成できませんでした: {0}")]
    Pattern(String),
}

/// Values substituted into a template when rendering a target path.
#[derive(Debug, Clone, Copy)]
pub struct PathFields<'a> {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub event: &'a str,
    pub file: &'a str,
}

pub fn validate_template(input: &str) -> Result<(), TemplateError> {
    parse_template(input).map(|_| ())
}

pub fn parse_template(input: &str) -> Result<Vec<TemplatePart>, TemplateError> {
    if input.is_empty() {
        return Err(TemplateError::Empty);
    }

    let mut parts = Vec::new();
    let mut rest = input;
    while let Some(brace) = rest.find(['{', '}']) {
        let (literal, tail) = rest.split_at(brace);
        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(literal.to_string()));
        }
        let body = tail
            .strip_prefix('{')
            .ok_or(TemplateError::UnbalancedBraces)?;
        let (name, after) = body
            .split_once('}')
            .ok_or(TemplateError::UnbalancedBraces)?;
        if name.is_empty() || name.contains('{') {
            return Err(TemplateError::UnbalancedBraces);
        }
        parts.push(TemplatePart::Token(parse_token(name)?));
        rest = after;
    }
    if !rest.is_empty() {
        parts.push(TemplatePart::Literal(rest.to_string()));
    }

    Ok(parts)
}

pub fn render_template(parts: &[TemplatePart], fields: &PathFields<'_>) -> String {
    let mut output = String::new();
    for part in parts {
        match part {
            TemplatePart::Literal(s) => output.push_str(s),
            TemplatePart::Token(token) => match token {
                Token::Year => output.push_str(&format!("{:04}", fields.year)),
                Token::Month => output.push_str(&format!("{:02}", fields.month)),
                Token::Day => output.push_str(&format!("{:02}", fields.day)),
                Token::Event => output.push_str(fields.event),
                Token::File => output.push_str(fields.file),
            },
        }
    }
    output
}

/// Renders the template and drops the blank left behind by an empty event.
pub fn render_path(parts: &[TemplatePart], fields: &PathFields<'_>) -> String {
    collapse_separator_spaces(&render_template(parts, fields))
}

fn collapse_separator_spaces(rendered: &str) -> String {
    rendered.replace("/ ", "/").replace(" /", "/")
}

/// Builds the regular expression source for matching stored paths against
/// the template. Only the first `{event}` is captured.
pub fn match_pattern_source(parts: &[TemplatePart]) -> String {
    let mut pattern = String::from("^(?:.*/)?");
    let mut event_captured = false;
    for part in parts {
        match part {
            TemplatePart::Literal(s) => pattern.push_str(&regex::escape(s)),
            TemplatePart::Token(token) => match token {
                Token::Year => pattern.push_str(r"\d{4}"),
                Token::Month | Token::Day => pattern.push_str(r"\d{2}"),
                Token::File => pattern.push_str("[^/]*"),
                Token::Event if !event_captured => {
                    event_captured = true;
                    pattern.push_str("([^/]*(?:/[^/]*)*)");
                }
                Token::Event => pattern.push_str("(?:[^/]*(?:/[^/]*)*)"),
            },
        }
    }
    pattern.push('$');
    pattern
}

/// Converts a raw event capture into a display name: underscores become
/// spaces and nested directories are joined with " - ".
pub fn normalize_event_name(captured: &str) -> String {
    captured.replace('_', " ").replace('/', " - ")
}

#[derive(Debug, Clone)]
pub struct PathMatcher {
    regex: Regex,
}

impl PathMatcher {
    pub fn new(parts: &[TemplatePart]) -> Result<Self, TemplateError> {
        let source = match_pattern_source(parts);
        let regex = Regex::new(&source).map_err(|err| TemplateError::Pattern(err.to_string()))?;
        Ok(Self { regex })
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Raw first capture, without display normalization.
    pub fn capture_raw<'p>(&self, path: &'p str) -> Option<&'p str> {
        self.regex
            .captures(path)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    pub fn capture_event(&self, path: &str) -> Option<String> {
        self.capture_raw(path).map(normalize_event_name)
    }
}

/// A template parsed once and usable in both directions.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    source: String,
    parts: Vec<TemplatePart>,
    matcher: PathMatcher,
}

impl CompiledTemplate {
    pub fn compile(input: &str) -> Result<Self, TemplateError> {
        let parts = parse_template(input)?;
        let matcher = PathMatcher::new(&parts)?;
        Ok(Self {
            source: input.to_string(),
            parts,
            matcher,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn parts(&self) -> &[TemplatePart] {
        &self.parts
    }

    pub fn has_event(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, TemplatePart::Token(Token::Event)))
    }

    pub fn render(&self, fields: &PathFields<'_>) -> String {
        render_path(&self.parts, fields)
    }

    pub fn matcher(&self) -> &PathMatcher {
        &self.matcher
    }
}

fn parse_token(token: &str) -> Result<Token, TemplateError> {
    match token {
        "y" => Ok(Token::Year),
        "m" => Ok(Token::Month),
        "d" => Ok(Token::Day),
        "event" => Ok(Token::Event),
        "file" => Ok(Token::File),
        other => Err(TemplateError::UnknownToken(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_TEMPLATE;

    fn fields<'a>(event: &'a str, file: &'a str) -> PathFields<'a> {
        PathFields {
            year: 2020,
            month: 3,
            day: 5,
            event,
            file,
        }
    }

    #[test]
    fn parse_template_ok() {
        let parsed = parse_template(DEFAULT_TEMPLATE).expect("must parse");
        assert_eq!(
            parsed,
            vec![
                TemplatePart::Token(Token::Year),
                TemplatePart::Literal("/".to_string()),
                TemplatePart::Token(Token::Year),
                TemplatePart::Literal("-".to_string()),
                TemplatePart::Token(Token::Month),
                TemplatePart::Literal("-".to_string()),
                TemplatePart::Token(Token::Day),
                TemplatePart::Literal(" ".to_string()),
                TemplatePart::Token(Token::Event),
                TemplatePart::Literal("/".to_string()),
                TemplatePart::Token(Token::File),
            ]
        );
    }

    #[test]
    fn parse_template_invalid_unknown() {
        let err = parse_template("{y}/{month}/{file}").expect_err("must fail");
        assert_eq!(err, TemplateError::UnknownToken("month".to_string()));
    }

    #[test]
    fn parse_template_invalid_brace() {
        assert_eq!(
            parse_template("{y").expect_err("must fail"),
            TemplateError::UnbalancedBraces
        );
        assert_eq!(
            parse_template("{y}}").expect_err("must fail"),
            TemplateError::UnbalancedBraces
        );
        assert_eq!(
            parse_template("{{y}}").expect_err("must fail"),
            TemplateError::UnbalancedBraces
        );
        assert_eq!(
            parse_template("}{y}").expect_err("must fail"),
            TemplateError::UnbalancedBraces
        );
        assert_eq!(
            parse_template("{y}/{}/{file}").expect_err("must fail"),
            TemplateError::UnbalancedBraces
        );
    }

    #[test]
    fn parse_template_rejects_empty() {
        assert_eq!(parse_template("").expect_err("must fail"), TemplateError::Empty);
    }

    #[test]
    fn render_default_template() {
        let parts = parse_template(DEFAULT_TEMPLATE).expect("must parse");
        let rendered = render_path(&parts, &fields("Trip_to_Spain", "IMG_0001.JPG"));
        assert_eq!(rendered, "2020/2020-03-05 Trip_to_Spain/IMG_0001.JPG");
    }

    #[test]
    fn render_pads_date_fields() {
        let parts = parse_template("{y}{m}{d}_{file}").expect("must parse");
        let rendered = render_path(
            &parts,
            &PathFields {
                year: 987,
                month: 1,
                day: 9,
                event: "",
                file: "a.jpg",
            },
        );
        assert_eq!(rendered, "09870109_a.jpg");
    }

    #[test]
    fn render_collapses_blank_event_segment() {
        let parts = parse_template("{y}/{event} {y}-{m}/{file}").expect("must parse");
        let rendered = render_path(&parts, &fields("", "IMG_0001.JPG"));
        assert_eq!(rendered, "2020/2020-03/IMG_0001.JPG");

        let parts = parse_template(DEFAULT_TEMPLATE).expect("must parse");
        let rendered = render_path(&parts, &fields("", "IMG_0001.JPG"));
        assert_eq!(rendered, "2020/2020-03-05/IMG_0001.JPG");
    }

    #[test]
    fn match_pattern_uses_escaped_literals() {
        let parts = parse_template("{y}.{m}/{event}/{file}").expect("must parse");
        let source = match_pattern_source(&parts);
        assert_eq!(
            source,
            r"^(?:.*/)?\d{4}\.\d{2}/([^/]*(?:/[^/]*)*)/[^/]*$"
        );
    }

    #[test]
    fn matcher_extracts_event_from_absolute_path() {
        let template = CompiledTemplate::compile(DEFAULT_TEMPLATE).expect("must compile");
        let event = template
            .matcher()
            .capture_event("/home/user/pics/2020/2020-03-05 Trip_to_Spain/IMG_0001.JPG");
        assert_eq!(event.as_deref(), Some("Trip to Spain"));
    }

    #[test]
    fn matcher_rejects_path_without_event_folder_shape() {
        let template = CompiledTemplate::compile(DEFAULT_TEMPLATE).expect("must compile");
        let matcher = template.matcher();
        assert!(!matcher.is_match("/home/user/pics/2020/random/IMG_0002.JPG"));
        assert_eq!(
            matcher.capture_event("/home/user/pics/2020/random/IMG_0002.JPG"),
            None
        );
    }

    #[test]
    fn matcher_flattens_multi_level_events() {
        let template = CompiledTemplate::compile(DEFAULT_TEMPLATE).expect("must compile");
        let event = template
            .matcher()
            .capture_event("/data/2019/2019-12-24 Family/Christmas_Eve/IMG_7.JPG");
        assert_eq!(event.as_deref(), Some("Family - Christmas Eve"));
    }

    #[test]
    fn matcher_captures_only_first_event_token() {
        let template = CompiledTemplate::compile("{event}/{y}/{event}/{file}").expect("must compile");
        let event = template.matcher().capture_raw("/x/Trip/2020/Trip/IMG.JPG");
        assert_eq!(event, Some("Trip"));
    }

    #[test]
    fn render_then_match_recovers_event_up_to_normalization() {
        let template = CompiledTemplate::compile(DEFAULT_TEMPLATE).expect("must compile");
        for (event, expected) in [
            ("Birthday", "Birthday"),
            ("Trip_to_Spain", "Trip to Spain"),
            ("Summer/Beach", "Summer - Beach"),
        ] {
            let rendered = template.render(&fields(event, "IMG_0001.JPG"));
            let absolute = format!("/srv/export/{rendered}");

            assert_eq!(template.matcher().capture_raw(&absolute), Some(event));
            assert_eq!(template.matcher().capture_raw(&rendered), Some(event));
            assert_eq!(
                template.matcher().capture_event(&absolute).as_deref(),
                Some(expected)
            );
        }
    }

    #[test]
    fn compiled_template_reports_event_presence() {
        let with_event = CompiledTemplate::compile(DEFAULT_TEMPLATE).expect("must compile");
        assert!(with_event.has_event());
        assert_eq!(with_event.source(), DEFAULT_TEMPLATE);

        let without_event = CompiledTemplate::compile("{y}/{m}/{file}").expect("must compile");
        assert!(!without_event.has_event());
        assert_eq!(
            without_event.matcher().capture_event("/a/2020/03/IMG.JPG"),
            None
        );
        assert!(without_event.matcher().is_match("/a/2020/03/IMG.JPG"));
    }
}
