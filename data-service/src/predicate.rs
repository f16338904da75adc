//! 结构化过滤条件
//!
//! 条件不会以原始文本进入 SQL。每种可接受的写法都被转换为以 `AND` 连接的
//! `field op value` 子句列表，再由语句构建器编译为参数化的 `WHERE` 子句。

use serde_json::{Map, Number, Value};

use common::errors::{AppError, AppResult};
use common::models::request::{ConditionClause, ConditionInput};
use common::utils::Sanitizer;

/// 支持的比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    IsNull,
    IsNotNull,
}

impl CompareOp {
    /// 解析运算符（`=`、`!=`、`<>`、`<`、`<=`、`>`、`>=`、`LIKE`、
    /// `IS NULL`、`IS NOT NULL`），不区分大小写
    pub fn parse(token: &str) -> AppResult<Self> {
        let normalized = token.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        match normalized.as_str() {
            "=" | "==" => Ok(CompareOp::Eq),
            "!=" | "<>" => Ok(CompareOp::Ne),
            "<" => Ok(CompareOp::Lt),
            "<=" => Ok(CompareOp::Le),
            ">" => Ok(CompareOp::Gt),
            ">=" => Ok(CompareOp::Ge),
            "LIKE" => Ok(CompareOp::Like),
            "IS NULL" => Ok(CompareOp::IsNull),
            "IS NOT NULL" => Ok(CompareOp::IsNotNull),
            _ => Err(AppError::InvalidPredicate(format!("unsupported operator {:?}", token))),
        }
    }

    /// 运算符的 SQL 写法
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Like => "LIKE",
            CompareOp::IsNull => "IS NULL",
            CompareOp::IsNotNull => "IS NOT NULL",
        }
    }

    /// 运算符是否需要右侧的值
    pub fn takes_value(&self) -> bool {
        !matches!(self, CompareOp::IsNull | CompareOp::IsNotNull)
    }
}

/// 一个 `field op value` 比较，`field` 为已校验的标识符
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

impl Clause {
    /// 构建子句：校验字段名，并把与 `null` 的比较规范为 `IS [NOT] NULL`
    pub fn new(field: &str, op: CompareOp, value: Value) -> AppResult<Self> {
        Sanitizer::validate_identifier(field)?;
        let op = match (op, &value) {
            (CompareOp::Eq, Value::Null) => CompareOp::IsNull,
            (CompareOp::Ne, Value::Null) => CompareOp::IsNotNull,
            (op, Value::Null) if op.takes_value() => {
                return Err(AppError::InvalidPredicate(format!(
                    "{} cannot compare against null",
                    op.as_sql()
                )));
            }
            (op, _) => op,
        };
        if op == CompareOp::Like && !value.is_string() {
            return Err(AppError::InvalidPredicate("LIKE needs a string pattern".into()));
        }
        if matches!(value, Value::Array(_) | Value::Object(_)) {
            return Err(AppError::InvalidPredicate(format!(
                "value for {} must be a scalar",
                field
            )));
        }
        let value = if op.takes_value() { value } else { Value::Null };
        Ok(Self {
            field: field.to_string(),
            op,
            value,
        })
    }
}

/// 子句的合取
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Predicate {
    pub clauses: Vec<Clause>,
}

impl Predicate {
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// 将任意可接受的请求格式转换为过滤条件
    pub fn from_input(input: &ConditionInput) -> AppResult<Self> {
        match input {
            ConditionInput::Text(text) => Self::parse(text),
            ConditionInput::Fields(fields) => Self::equalities(fields),
            ConditionInput::Clauses(clauses) => Self::from_clauses(clauses),
        }
    }

    /// `{"a": 1, "b": "x"}` 转换为 `a = 1 AND b = 'x'`
    pub fn equalities(fields: &Map<String, Value>) -> AppResult<Self> {
        let clauses = fields
            .iter()
            .map(|(field, value)| Clause::new(field, CompareOp::Eq, value.clone()))
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Self { clauses })
    }

    fn from_clauses(clauses: &[ConditionClause]) -> AppResult<Self> {
        let clauses = clauses
            .iter()
            .map(|c| Clause::new(&c.field, CompareOp::parse(&c.op)?, c.value.clone()))
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Self { clauses })
    }

    /// 解析文本条件，例如 `id = 1 AND name LIKE 'a%'`
    ///
    /// 语法：`clause (AND clause)*`，子句为 `ident op literal`、
    /// `ident LIKE 'text'` 或 `ident IS [NOT] NULL`；字面量为数字、单引号字符串、
    /// `TRUE`、`FALSE` 或 `NULL`。OR、子查询、函数、注释等一律拒绝。
    pub fn parse(text: &str) -> AppResult<Self> {
        let tokens = tokenize(text)?;
        let mut parser = Parser { tokens, pos: 0 };
        let mut clauses = Vec::new();

        if parser.peek().is_none() {
            return Ok(Self { clauses });
        }
        loop {
            clauses.push(parser.clause()?);
            match parser.next() {
                None => break,
                Some(Token::Word(w)) if w.eq_ignore_ascii_case("AND") => continue,
                Some(other) => {
                    return Err(AppError::InvalidPredicate(format!(
                        "expected AND, found {}",
                        other.describe()
                    )))
                }
            }
        }
        Ok(Self { clauses })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Number(String),
    Str(String),
    Op(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Word(w) => format!("{:?}", w),
            Token::Number(n) => n.clone(),
            Token::Str(s) => format!("'{}'", s),
            Token::Op(o) => o.clone(),
        }
    }
}

fn tokenize(text: &str) -> AppResult<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Word(chars[start..i].iter().collect()));
        } else if c.is_ascii_digit()
            || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()))
        {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Number(chars[start..i].iter().collect()));
        } else if c == '\'' {
            let mut value = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => {
                        return Err(AppError::InvalidPredicate(
                            "unterminated string literal".into(),
                        ))
                    }
                    Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                        value.push('\'');
                        i += 2;
                    }
                    Some('\'') => {
                        i += 1;
                        break;
                    }
                    Some(ch) => {
                        value.push(*ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Str(value));
        } else if matches!(c, '=' | '!' | '<' | '>') {
            let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
            if matches!(two.as_str(), "<=" | ">=" | "<>" | "!=" | "==") {
                tokens.push(Token::Op(two));
                i += 2;
            } else if c == '!' {
                return Err(AppError::InvalidPredicate("unexpected '!'".into()));
            } else {
                tokens.push(Token::Op(c.to_string()));
                i += 1;
            }
        } else {
            return Err(AppError::InvalidPredicate(format!(
                "unexpected character {:?}",
                c
            )));
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect_word(&mut self, word: &str) -> AppResult<()> {
        match self.next() {
            Some(Token::Word(w)) if w.eq_ignore_ascii_case(word) => Ok(()),
            other => Err(AppError::InvalidPredicate(format!(
                "expected {}, found {}",
                word,
                other.map_or("end of condition".to_string(), |t| t.describe())
            ))),
        }
    }

    fn clause(&mut self) -> AppResult<Clause> {
        let field = match self.next() {
            Some(Token::Word(w)) if !is_keyword(&w) => w,
            other => {
                return Err(AppError::InvalidPredicate(format!(
                    "expected column name, found {}",
                    other.map_or("end of condition".to_string(), |t| t.describe())
                )))
            }
        };

        match self.next() {
            Some(Token::Op(op)) => {
                let op = CompareOp::parse(&op)?;
                let value = self.literal()?;
                Clause::new(&field, op, value)
            }
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("LIKE") => {
                let value = self.literal()?;
                Clause::new(&field, CompareOp::Like, value)
            }
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("IS") => {
                let negated = matches!(self.peek(), Some(Token::Word(n)) if n.eq_ignore_ascii_case("NOT"));
                if negated {
                    self.pos += 1;
                }
                self.expect_word("NULL")?;
                let op = if negated { CompareOp::IsNotNull } else { CompareOp::IsNull };
                Clause::new(&field, op, Value::Null)
            }
            other => Err(AppError::InvalidPredicate(format!(
                "expected operator after {}, found {}",
                field,
                other.map_or("end of condition".to_string(), |t| t.describe())
            ))),
        }
    }

    fn literal(&mut self) -> AppResult<Value> {
        match self.next() {
            Some(Token::Number(n)) => parse_number(&n),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("TRUE") => Ok(Value::Bool(true)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("FALSE") => Ok(Value::Bool(false)),
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("NULL") => Ok(Value::Null),
            other => Err(AppError::InvalidPredicate(format!(
                "expected a literal value, found {}",
                other.map_or("end of condition".to_string(), |t| t.describe())
            ))),
        }
    }
}

fn is_keyword(word: &str) -> bool {
    ["AND", "OR", "NOT", "IS", "NULL", "LIKE", "TRUE", "FALSE"]
        .iter()
        .any(|k| k.eq_ignore_ascii_case(word))
}

fn parse_number(text: &str) -> AppResult<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::Number(i.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| AppError::InvalidPredicate(format!("invalid number {}", text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clause(field: &str, op: CompareOp, value: Value) -> Clause {
        Clause::new(field, op, value).unwrap()
    }

    #[test]
    fn test_parse_simple_equality() {
        let p = Predicate::parse("id = 1").unwrap();
        assert_eq!(p.clauses, vec![clause("id", CompareOp::Eq, json!(1))]);
    }

    #[test]
    fn test_parse_conjunction_of_comparisons() {
        let p = Predicate::parse("age >= 18 and name <> 'O''Brien' AND score < -2.5 AND active = true").unwrap();
        assert_eq!(
            p.clauses,
            vec![
                clause("age", CompareOp::Ge, json!(18)),
                clause("name", CompareOp::Ne, json!("O'Brien")),
                clause("score", CompareOp::Lt, json!(-2.5)),
                clause("active", CompareOp::Eq, json!(true)),
            ]
        );
    }

    #[test]
    fn test_parse_null_checks_and_like() {
        let p = Predicate::parse("deleted_at IS NULL AND email IS NOT NULL AND name LIKE 'a%' AND x = NULL").unwrap();
        let ops: Vec<_> = p.clauses.iter().map(|c| c.op).collect();
        assert_eq!(
            ops,
            vec![CompareOp::IsNull, CompareOp::IsNotNull, CompareOp::Like, CompareOp::IsNull]
        );
    }

    #[test]
    fn test_parse_blank_is_empty() {
        assert!(Predicate::parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_injection_attempts() {
        for text in [
            "1=1",
            "id = 1 OR 1 = 1",
            "id = 1; DROP TABLE devs",
            "id = 1 -- comment",
            "id = (SELECT 1)",
            "name = 'unterminated",
            "id = lower('x')",
            "id",
            "id =",
            "id = 1 AND",
            "\"id\" = 1",
            "id IS 5",
        ] {
            assert!(
                matches!(Predicate::parse(text), Err(AppError::InvalidPredicate(_)) | Err(AppError::InvalidIdentifier(_))),
                "accepted {:?}",
                text
            );
        }
    }

    #[test]
    fn test_equality_mapping() {
        let input = ConditionInput::Fields(json!({"id": 1, "name": "x"}).as_object().unwrap().clone());
        let p = Predicate::from_input(&input).unwrap();
        assert_eq!(
            p.clauses,
            vec![clause("id", CompareOp::Eq, json!(1)), clause("name", CompareOp::Eq, json!("x"))]
        );
    }

    #[test]
    fn test_equality_mapping_rejects_bad_field() {
        let input = ConditionInput::Fields(json!({"id; --": 1}).as_object().unwrap().clone());
        assert!(matches!(
            Predicate::from_input(&input),
            Err(AppError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_structured_clauses() {
        let input: ConditionInput = serde_json::from_value(json!([
            {"field": "age", "op": ">", "value": 30},
            {"field": "nick", "op": "!=", "value": null}
        ]))
        .unwrap();
        let p = Predicate::from_input(&input).unwrap();
        assert_eq!(p.clauses[0].op, CompareOp::Gt);
        assert_eq!(p.clauses[1].op, CompareOp::IsNotNull);

        let bad: ConditionInput =
            serde_json::from_value(json!([{"field": "age", "op": "BETWEEN", "value": 1}])).unwrap();
        assert!(Predicate::from_input(&bad).is_err());
    }

    #[test]
    fn test_clause_rejects_non_scalar_and_bad_like() {
        assert!(Clause::new("a", CompareOp::Eq, json!([1, 2])).is_err());
        assert!(Clause::new("a", CompareOp::Like, json!(1)).is_err());
        assert!(Clause::new("a", CompareOp::Lt, Value::Null).is_err());
    }
}
