//! Flat token scans over the source text.
//!
//! Everything here walks the token stream in a loop and never builds an
//! AST, so it is safe to run on inputs the recursive passes cannot handle.

use sqlparser::dialect::{dialect_from_str, Dialect, GenericDialect};
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, TokenWithSpan, Tokenizer};

use crate::model::Location;

/// Estimated expression nesting of `sql`.
///
/// Binary operators chained at one parenthesis level nest one level each in
/// the parsed tree, and every open parenthesis adds one more. Commas and
/// clause keywords start a new expression. Returns `None` when the text does
/// not tokenize; the parser reports that itself.
pub fn expression_depth(dialect: &str, sql: &str) -> Option<usize> {
    let generic = GenericDialect {};
    let named = dialect_from_str(dialect);
    let dialect: &dyn Dialect = named.as_deref().unwrap_or(&generic);
    let tokens = Tokenizer::new(dialect, sql).tokenize().ok()?;

    let mut levels: Vec<usize> = vec![0];
    let mut current = 0usize;
    let mut deepest = 0usize;
    for token in &tokens {
        match token {
            Token::LParen | Token::LBracket => {
                levels.push(0);
                current += 1;
            }
            Token::RParen | Token::RBracket => {
                if levels.len() > 1 {
                    current -= levels.pop().unwrap_or_default() + 1;
                }
            }
            Token::Comma | Token::SemiColon => restart(&mut levels, &mut current),
            Token::Word(word) if word.quote_style.is_none() && starts_clause(word.keyword) => {
                restart(&mut levels, &mut current)
            }
            token if chains(token) => {
                if let Some(level) = levels.last_mut() {
                    *level += 1;
                    current += 1;
                }
            }
            _ => continue,
        }
        deepest = deepest.max(current);
    }
    Some(deepest)
}

fn restart(levels: &mut [usize], current: &mut usize) {
    if let Some(level) = levels.last_mut() {
        *current -= *level;
        *level = 0;
    }
}

fn starts_clause(keyword: Keyword) -> bool {
    matches!(
        keyword,
        Keyword::SELECT
            | Keyword::FROM
            | Keyword::WHERE
            | Keyword::GROUP
            | Keyword::HAVING
            | Keyword::ORDER
            | Keyword::LIMIT
            | Keyword::OFFSET
            | Keyword::JOIN
            | Keyword::ON
            | Keyword::UNION
            | Keyword::EXCEPT
            | Keyword::INTERSECT
            | Keyword::WITH
            | Keyword::WHEN
            | Keyword::THEN
            | Keyword::ELSE
    )
}

fn chains(token: &Token) -> bool {
    match token {
        Token::Word(word) if word.quote_style.is_none() => matches!(
            word.keyword,
            Keyword::AND | Keyword::OR | Keyword::LIKE | Keyword::ILIKE | Keyword::IS | Keyword::IN
        ),
        Token::Eq
        | Token::DoubleEq
        | Token::Neq
        | Token::Lt
        | Token::Gt
        | Token::LtEq
        | Token::GtEq
        | Token::Spaceship
        | Token::Plus
        | Token::Minus
        | Token::Mul
        | Token::Div
        | Token::DuckIntDiv
        | Token::Mod
        | Token::StringConcat
        | Token::Ampersand
        | Token::Pipe
        | Token::Caret
        | Token::ShiftLeft
        | Token::ShiftRight
        | Token::DoubleColon
        | Token::Arrow
        | Token::LongArrow => true,
        _ => false,
    }
}

/// The tokens of a statement with their positions, whitespace and comments
/// dropped. Used to point issues at the right place in the source.
#[derive(Debug, Clone)]
pub struct SourceTokens<'a> {
    sql: &'a str,
    tokens: Vec<TokenWithSpan>,
}

impl<'a> SourceTokens<'a> {
    /// Tokenizes `sql`; text that does not tokenize yields no tokens, so
    /// every lookup returns `None`.
    pub fn new(sql: &'a str) -> Self {
        let tokens = Tokenizer::new(&GenericDialect {}, sql)
            .tokenize_with_location()
            .map(|tokens| {
                tokens
                    .into_iter()
                    .filter(|token| !matches!(token.token, Token::Whitespace(_) | Token::EOF))
                    .collect()
            })
            .unwrap_or_default();
        Self { sql, tokens }
    }

    fn location(&self, index: usize) -> Option<Location> {
        let start = self.tokens.get(index)?.span.start;
        Location::from_line_column(self.sql, start.line as usize, start.column as usize)
    }

    /// First statement separator that is followed by more input
    pub fn statement_separator(&self) -> Option<Location> {
        let index = self
            .tokens
            .iter()
            .enumerate()
            .position(|(i, token)| token.token == Token::SemiColon && i + 1 < self.tokens.len())?;
        self.location(index)
    }

    /// Index of the first token matching `wanted` at the shallowest
    /// parenthesis depth
    fn outermost(&self, wanted: impl Fn(usize) -> bool) -> Option<usize> {
        let mut depth = 0usize;
        let mut best: Option<(usize, usize)> = None;
        for (i, token) in self.tokens.iter().enumerate() {
            match token.token {
                Token::LParen => depth += 1,
                Token::RParen => depth = depth.saturating_sub(1),
                _ if wanted(i) && best.map_or(true, |(shallowest, _)| depth < shallowest) => {
                    best = Some((depth, i));
                }
                _ => {}
            }
        }
        best.map(|(_, index)| index)
    }

    /// The outermost `*` or `t.*` in a SELECT list
    pub fn select_wildcard(&self) -> Option<Location> {
        let index = self.outermost(|i| {
            self.tokens[i].token == Token::Mul
                && i.checked_sub(1)
                    .and_then(|prev| self.tokens.get(prev))
                    .is_some_and(|prev| match &prev.token {
                        Token::Comma | Token::Period => true,
                        Token::Word(word) => matches!(
                            word.keyword,
                            Keyword::SELECT | Keyword::DISTINCT | Keyword::ALL
                        ),
                        _ => false,
                    })
        })?;
        let qualified = index >= 2 && self.tokens[index - 1].token == Token::Period;
        self.location(if qualified { index - 2 } else { index })
    }

    /// The outermost use of `keyword`, ignoring quoted identifiers,
    /// string literals and comments
    pub fn keyword(&self, keyword: Keyword) -> Option<Location> {
        let index = self.outermost(|i| {
            matches!(&self.tokens[i].token, Token::Word(word) if word.quote_style.is_none() && word.keyword == keyword)
        })?;
        self.location(index)
    }

    /// First occurrence of `fragment`, compared token by token so that
    /// spacing and keyword case do not matter
    pub fn find_fragment(&self, fragment: &str) -> Option<Location> {
        let needle: Vec<Token> = Tokenizer::new(&GenericDialect {}, fragment)
            .tokenize()
            .ok()?
            .into_iter()
            .filter(|token| !matches!(token, Token::Whitespace(_) | Token::EOF))
            .collect();
        if needle.is_empty() || needle.len() > self.tokens.len() {
            return None;
        }
        let index = self.tokens.windows(needle.len()).position(|window| {
            window
                .iter()
                .zip(&needle)
                .all(|(have, want)| same_token(&have.token, want))
        })?;
        self.location(index)
    }

    /// The first call to `function` that sits inside a WHERE clause
    pub fn call_in_where(&self, function: &str) -> Option<Location> {
        let mut depth = 0usize;
        // Paren depth of each WHERE clause still open
        let mut open_where: Vec<usize> = Vec::new();
        for (i, token) in self.tokens.iter().enumerate() {
            match &token.token {
                Token::LParen => depth += 1,
                Token::RParen => {
                    open_where.retain(|level| *level < depth);
                    depth = depth.saturating_sub(1);
                }
                Token::SemiColon => open_where.clear(),
                Token::Word(word) if word.quote_style.is_none() => match word.keyword {
                    Keyword::WHERE => open_where.push(depth),
                    Keyword::GROUP
                    | Keyword::HAVING
                    | Keyword::ORDER
                    | Keyword::LIMIT
                    | Keyword::UNION
                    | Keyword::EXCEPT
                    | Keyword::INTERSECT
                    | Keyword::WINDOW
                    | Keyword::QUALIFY => open_where.retain(|level| *level != depth),
                    _ if open_where.last() == Some(&depth)
                        && word.value.eq_ignore_ascii_case(function)
                        && self.tokens.get(i + 1).is_some_and(|next| next.token == Token::LParen) =>
                    {
                        return self.location(i);
                    }
                    _ => {}
                },
                _ => {}
            }
        }
        None
    }
}

fn same_token(have: &Token, want: &Token) -> bool {
    match (have, want) {
        (Token::Word(have), Token::Word(want)) => {
            have.quote_style == want.quote_style && have.value.eq_ignore_ascii_case(&want.value)
        }
        (have, want) => have == want,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_conjunctions_count_each_operator() {
        let depth = expression_depth("generic", "SELECT a FROM t WHERE a = 1 AND b = 2 AND c = 3").unwrap();
        assert_eq!(depth, 5);
    }

    #[test]
    fn commas_and_clauses_start_over() {
        let depth = expression_depth("generic", "SELECT a + b, c + d FROM t WHERE x = 1 ORDER BY a").unwrap();
        assert_eq!(depth, 1);
    }

    #[test]
    fn parentheses_add_to_the_enclosing_chain() {
        let depth = expression_depth("generic", "SELECT 1 + (2 + (3 + 4))").unwrap();
        assert_eq!(depth, 5);
    }

    #[test]
    fn long_chains_are_measured_without_recursion() {
        let sql = format!("SELECT a FROM t WHERE {}a = 1", "a = 1 AND ".repeat(20_000));
        assert!(expression_depth("generic", &sql).unwrap() >= 40_000);
    }

    #[test]
    fn separator_ignores_trailing_semicolons_and_strings() {
        assert!(SourceTokens::new("SELECT 1;").statement_separator().is_none());
        let sql = "SELECT ';' AS s; SELECT 2";
        assert_eq!(SourceTokens::new(sql).statement_separator().map(|l| l.offset), Some(15));
    }

    #[test]
    fn wildcard_skips_count_star() {
        let sql = "SELECT COUNT(*), s.* FROM sales s";
        assert_eq!(SourceTokens::new(sql).select_wildcard().map(|l| l.offset), Some(17));
        assert!(SourceTokens::new("SELECT COUNT(*) FROM t").select_wildcard().is_none());
    }

    #[test]
    fn wildcard_prefers_the_outer_query() {
        let sql = "WITH x AS (SELECT * FROM sales) SELECT * FROM x";
        assert_eq!(SourceTokens::new(sql).select_wildcard().map(|l| l.offset), Some(39));
    }

    #[test]
    fn keywords_in_comments_and_strings_are_skipped() {
        let sql = "-- pulled from group stats\nSELECT 'from' AS f FROM sales";
        let location = SourceTokens::new(sql).keyword(Keyword::FROM).unwrap();
        assert_eq!(&sql[location.offset..location.offset + 4], "FROM");
        assert_eq!(location.line, 2);
    }

    #[test]
    fn fragments_match_across_spacing_and_case() {
        let sql = "SELECT a FROM t\nWHERE  1=1 and a is null";
        let tokens = SourceTokens::new(sql);
        assert_eq!(tokens.find_fragment("1 = 1").map(|l| (l.line, l.column)), Some((2, 8)));
        assert_eq!(tokens.find_fragment("a IS NULL").map(|l| l.column), Some(16));
        assert!(tokens.find_fragment("2 = 2").is_none());
    }

    #[test]
    fn where_calls_skip_earlier_blocks() {
        let sql = "WITH totals AS (SELECT region, SUM(x) AS s FROM t WHERE y > 0 GROUP BY region) \
                   SELECT region FROM totals WHERE SUM(s) > 10";
        let location = SourceTokens::new(sql).call_in_where("SUM").unwrap();
        assert_eq!(&sql[location.offset..location.offset + 6], "SUM(s)");
    }
}
