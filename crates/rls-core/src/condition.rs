// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Restricted condition language for `conditional` policies.
//!
//! Custom conditions are administrator-authored boolean expressions. Instead
//! of splicing them into query text, they are parsed into a [`ConditionExpr`]
//! and compiled to parameterised SQL where every literal and placeholder is a
//! bind and every column reference is a validated, quoted identifier.
//!
//! Supported forms:
//!
//! ```text
//! is_public = true
//! owner_id = :user_id OR :organization_id IN (1, 2, 3)
//! NOT (status = 'archived') AND deleted_at IS NULL
//! ```
//!
//! Subqueries, function calls and arithmetic are rejected at parse time.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::sql::{quote_identifier, SqlValue};
use crate::types::{OrgId, UserId};

const MAX_DEPTH: usize = 64;

/// Placeholders that may appear in a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placeholder {
	UserId,
	OrganizationId,
	EntityId,
	TenantId,
}

impl Placeholder {
	fn parse(name: &str) -> Option<Self> {
		match name {
			"user_id" => Some(Placeholder::UserId),
			"organization_id" => Some(Placeholder::OrganizationId),
			"entity_id" => Some(Placeholder::EntityId),
			"tenant_id" => Some(Placeholder::TenantId),
			_ => None,
		}
	}
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
	Eq,
	NotEq,
	Lt,
	LtEq,
	Gt,
	GtEq,
}

impl CompareOp {
	fn as_sql(self) -> &'static str {
		match self {
			CompareOp::Eq => "=",
			CompareOp::NotEq => "<>",
			CompareOp::Lt => "<",
			CompareOp::LtEq => "<=",
			CompareOp::Gt => ">",
			CompareOp::GtEq => ">=",
		}
	}
}

/// Parsed condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConditionExpr {
	Literal(SqlValue),
	Placeholder(Placeholder),
	Column(String),
	Compare {
		left: Box<ConditionExpr>,
		op: CompareOp,
		right: Box<ConditionExpr>,
	},
	IsNull {
		expr: Box<ConditionExpr>,
		negated: bool,
	},
	InList {
		expr: Box<ConditionExpr>,
		list: Vec<ConditionExpr>,
		negated: bool,
	},
	And(Box<ConditionExpr>, Box<ConditionExpr>),
	Or(Box<ConditionExpr>, Box<ConditionExpr>),
	Not(Box<ConditionExpr>),
}

/// Values substituted for placeholders at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionBindings {
	pub user_id: UserId,
	pub organization_id: Option<OrgId>,
	pub entity_id: Option<i64>,
	pub tenant_id: Option<String>,
}

impl ConditionBindings {
	fn value_of(&self, placeholder: Placeholder) -> SqlValue {
		match placeholder {
			Placeholder::UserId => SqlValue::Integer(self.user_id.get()),
			// Unset organization binds as 0 so comparisons stay well-defined.
			Placeholder::OrganizationId => {
				SqlValue::Integer(self.organization_id.map(OrgId::get).unwrap_or(0))
			}
			Placeholder::EntityId => self.entity_id.into(),
			Placeholder::TenantId => self
				.tenant_id
				.as_deref()
				.map(SqlValue::from)
				.unwrap_or(SqlValue::Null),
		}
	}
}

/// A condition compiled to SQL with positional binds.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCondition {
	pub sql: String,
	pub params: Vec<SqlValue>,
	pub references_columns: bool,
}

impl ConditionExpr {
	/// Parses a condition string.
	pub fn parse(input: &str) -> Result<Self> {
		let tokens = tokenize(input)?;
		let mut parser = Parser {
			tokens,
			pos: 0,
			depth: 0,
		};
		let expr = parser.parse_or()?;
		match parser.peek() {
			Token {
				kind: TokenKind::Eof,
				..
			} => Ok(expr),
			tok => Err(parse_error(tok.offset, "unexpected trailing input")),
		}
	}

	/// Compiles the expression, binding placeholder values.
	pub fn compile(&self, bindings: &ConditionBindings) -> Result<CompiledCondition> {
		let mut out = CompiledCondition {
			sql: String::new(),
			params: Vec::new(),
			references_columns: false,
		};
		self.write_sql(bindings, &mut out)?;
		Ok(out)
	}

	fn write_sql(&self, bindings: &ConditionBindings, out: &mut CompiledCondition) -> Result<()> {
		match self {
			ConditionExpr::Literal(SqlValue::Null) => out.sql.push_str("NULL"),
			ConditionExpr::Literal(value) => {
				out.sql.push('?');
				out.params.push(value.clone());
			}
			ConditionExpr::Placeholder(p) => {
				out.sql.push('?');
				out.params.push(bindings.value_of(*p));
			}
			ConditionExpr::Column(name) => {
				out.sql.push_str(&quote_identifier(name)?);
				out.references_columns = true;
			}
			ConditionExpr::Compare { left, op, right } => {
				out.sql.push('(');
				left.write_sql(bindings, out)?;
				out.sql.push(' ');
				out.sql.push_str(op.as_sql());
				out.sql.push(' ');
				right.write_sql(bindings, out)?;
				out.sql.push(')');
			}
			ConditionExpr::IsNull { expr, negated } => {
				out.sql.push('(');
				expr.write_sql(bindings, out)?;
				out.sql.push_str(if *negated { " IS NOT NULL)" } else { " IS NULL)" });
			}
			ConditionExpr::InList {
				expr,
				list,
				negated,
			} => {
				out.sql.push('(');
				expr.write_sql(bindings, out)?;
				out.sql.push_str(if *negated { " NOT IN (" } else { " IN (" });
				for (i, item) in list.iter().enumerate() {
					if i > 0 {
						out.sql.push_str(", ");
					}
					item.write_sql(bindings, out)?;
				}
				out.sql.push_str("))");
			}
			ConditionExpr::And(l, r) | ConditionExpr::Or(l, r) => {
				let joiner = if matches!(self, ConditionExpr::And(..)) {
					" AND "
				} else {
					" OR "
				};
				out.sql.push('(');
				l.write_sql(bindings, out)?;
				out.sql.push_str(joiner);
				r.write_sql(bindings, out)?;
				out.sql.push(')');
			}
			ConditionExpr::Not(inner) => {
				out.sql.push_str("(NOT ");
				inner.write_sql(bindings, out)?;
				out.sql.push(')');
			}
		}
		Ok(())
	}
}

fn parse_error(position: usize, message: impl Into<String>) -> CoreError {
	CoreError::ConditionParse {
		position,
		message: message.into(),
	}
}

// =============================================================================
// Tokenizer
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
	Integer(i64),
	Text(String),
	Word(String),
	Placeholder(String),
	Op(CompareOp),
	LParen,
	RParen,
	Comma,
	Eof,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
	kind: TokenKind,
	offset: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
	let bytes = input.as_bytes();
	let mut tokens = Vec::new();
	let mut i = 0;

	while i < bytes.len() {
		let c = bytes[i] as char;
		let start = i;
		match c {
			' ' | '\t' | '\n' | '\r' => {
				i += 1;
				continue;
			}
			'(' => {
				i += 1;
				tokens.push(Token {
					kind: TokenKind::LParen,
					offset: start,
				});
			}
			')' => {
				i += 1;
				tokens.push(Token {
					kind: TokenKind::RParen,
					offset: start,
				});
			}
			',' => {
				i += 1;
				tokens.push(Token {
					kind: TokenKind::Comma,
					offset: start,
				});
			}
			'=' => {
				i += 1;
				tokens.push(Token {
					kind: TokenKind::Op(CompareOp::Eq),
					offset: start,
				});
			}
			'!' | '<' | '>' => {
				let next = bytes.get(i + 1).map(|b| *b as char);
				let (op, len) = match (c, next) {
					('!', Some('=')) => (CompareOp::NotEq, 2),
					('<', Some('>')) => (CompareOp::NotEq, 2),
					('<', Some('=')) => (CompareOp::LtEq, 2),
					('>', Some('=')) => (CompareOp::GtEq, 2),
					('<', _) => (CompareOp::Lt, 1),
					('>', _) => (CompareOp::Gt, 1),
					_ => return Err(parse_error(start, "expected '!='")),
				};
				i += len;
				tokens.push(Token {
					kind: TokenKind::Op(op),
					offset: start,
				});
			}
			'\'' => {
				i += 1;
				let mut text = String::new();
				loop {
					match bytes.get(i) {
						None => return Err(parse_error(start, "unterminated string literal")),
						Some(b'\'') if bytes.get(i + 1) == Some(&b'\'') => {
							text.push('\'');
							i += 2;
						}
						Some(b'\'') => {
							i += 1;
							break;
						}
						Some(_) => {
							let ch = input[i..]
								.chars()
								.next()
								.ok_or_else(|| parse_error(i, "invalid utf-8"))?;
							text.push(ch);
							i += ch.len_utf8();
						}
					}
				}
				tokens.push(Token {
					kind: TokenKind::Text(text),
					offset: start,
				});
			}
			':' => {
				i += 1;
				let name_start = i;
				while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
					i += 1;
				}
				if name_start == i {
					return Err(parse_error(start, "empty placeholder"));
				}
				tokens.push(Token {
					kind: TokenKind::Placeholder(input[name_start..i].to_string()),
					offset: start,
				});
			}
			'-' | '0'..='9' => {
				i += 1;
				while i < bytes.len() && bytes[i].is_ascii_digit() {
					i += 1;
				}
				let literal = &input[start..i];
				let value = literal
					.parse::<i64>()
					.map_err(|_| parse_error(start, format!("invalid integer {literal:?}")))?;
				tokens.push(Token {
					kind: TokenKind::Integer(value),
					offset: start,
				});
			}
			c if c.is_ascii_alphabetic() || c == '_' => {
				while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
					i += 1;
				}
				tokens.push(Token {
					kind: TokenKind::Word(input[start..i].to_string()),
					offset: start,
				});
			}
			other => return Err(parse_error(start, format!("unexpected character {other:?}"))),
		}
	}

	tokens.push(Token {
		kind: TokenKind::Eof,
		offset: input.len(),
	});
	Ok(tokens)
}

// =============================================================================
// Parser
// =============================================================================

struct Parser {
	tokens: Vec<Token>,
	pos: usize,
	depth: usize,
}

impl Parser {
	fn peek(&self) -> &Token {
		// tokenize always terminates the stream with Eof
		&self.tokens[self.pos.min(self.tokens.len() - 1)]
	}

	fn advance(&mut self) -> Token {
		let tok = self.peek().clone();
		if self.pos < self.tokens.len() - 1 {
			self.pos += 1;
		}
		tok
	}

	fn peek_keyword(&self, keyword: &str) -> bool {
		matches!(&self.peek().kind, TokenKind::Word(w) if w.eq_ignore_ascii_case(keyword))
	}

	fn eat_keyword(&mut self, keyword: &str) -> bool {
		if self.peek_keyword(keyword) {
			self.advance();
			true
		} else {
			false
		}
	}

	fn expect(&mut self, kind: TokenKind, what: &str) -> Result<()> {
		let tok = self.advance();
		if tok.kind == kind {
			Ok(())
		} else {
			Err(parse_error(tok.offset, format!("expected {what}")))
		}
	}

	fn enter(&mut self) -> Result<()> {
		self.depth += 1;
		if self.depth > MAX_DEPTH {
			return Err(parse_error(self.peek().offset, "condition nested too deeply"));
		}
		Ok(())
	}

	fn parse_or(&mut self) -> Result<ConditionExpr> {
		self.enter()?;
		let mut left = self.parse_and()?;
		while self.eat_keyword("OR") {
			let right = self.parse_and()?;
			left = ConditionExpr::Or(Box::new(left), Box::new(right));
		}
		self.depth -= 1;
		Ok(left)
	}

	fn parse_and(&mut self) -> Result<ConditionExpr> {
		let mut left = self.parse_not()?;
		while self.eat_keyword("AND") {
			let right = self.parse_not()?;
			left = ConditionExpr::And(Box::new(left), Box::new(right));
		}
		Ok(left)
	}

	fn parse_not(&mut self) -> Result<ConditionExpr> {
		if self.eat_keyword("NOT") {
			self.enter()?;
			let inner = self.parse_not()?;
			self.depth -= 1;
			return Ok(ConditionExpr::Not(Box::new(inner)));
		}
		self.parse_comparison()
	}

	fn parse_comparison(&mut self) -> Result<ConditionExpr> {
		let left = self.parse_operand()?;

		if let TokenKind::Op(op) = self.peek().kind {
			self.advance();
			let right = self.parse_operand()?;
			return Ok(ConditionExpr::Compare {
				left: Box::new(left),
				op,
				right: Box::new(right),
			});
		}

		if self.eat_keyword("IS") {
			let negated = self.eat_keyword("NOT");
			if !self.eat_keyword("NULL") {
				return Err(parse_error(self.peek().offset, "expected NULL"));
			}
			return Ok(ConditionExpr::IsNull {
				expr: Box::new(left),
				negated,
			});
		}

		let negated = if self.peek_keyword("NOT") {
			let offset = self.peek().offset;
			self.advance();
			if !self.peek_keyword("IN") {
				return Err(parse_error(offset, "expected IN after NOT"));
			}
			true
		} else {
			false
		};

		if self.eat_keyword("IN") {
			self.expect(TokenKind::LParen, "'('")?;
			let mut list = vec![self.parse_operand()?];
			while self.peek().kind == TokenKind::Comma {
				self.advance();
				list.push(self.parse_operand()?);
			}
			self.expect(TokenKind::RParen, "')'")?;
			return Ok(ConditionExpr::InList {
				expr: Box::new(left),
				list,
				negated,
			});
		}

		Ok(left)
	}

	fn parse_operand(&mut self) -> Result<ConditionExpr> {
		let tok = self.advance();
		match tok.kind {
			TokenKind::Integer(v) => Ok(ConditionExpr::Literal(SqlValue::Integer(v))),
			TokenKind::Text(s) => Ok(ConditionExpr::Literal(SqlValue::Text(s))),
			TokenKind::Placeholder(name) => Placeholder::parse(&name)
				.map(ConditionExpr::Placeholder)
				.ok_or_else(|| parse_error(tok.offset, format!("unknown placeholder :{name}"))),
			TokenKind::LParen => {
				let inner = self.parse_or()?;
				self.expect(TokenKind::RParen, "')'")?;
				Ok(inner)
			}
			TokenKind::Word(word) => {
				let upper = word.to_ascii_uppercase();
				match upper.as_str() {
					"TRUE" => Ok(ConditionExpr::Literal(SqlValue::Bool(true))),
					"FALSE" => Ok(ConditionExpr::Literal(SqlValue::Bool(false))),
					"NULL" => Ok(ConditionExpr::Literal(SqlValue::Null)),
					"AND" | "OR" | "NOT" | "IS" | "IN" | "SELECT" | "FROM" | "WHERE" | "UNION" => Err(
						parse_error(tok.offset, format!("unexpected keyword {word}")),
					),
					_ => {
						if self.peek().kind == TokenKind::LParen {
							return Err(parse_error(tok.offset, "function calls are not allowed"));
						}
						Ok(ConditionExpr::Column(word))
					}
				}
			}
			TokenKind::Eof => Err(parse_error(tok.offset, "unexpected end of condition")),
			_ => Err(parse_error(tok.offset, "expected an operand")),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn bindings() -> ConditionBindings {
		ConditionBindings {
			user_id: UserId::new(5),
			organization_id: None,
			entity_id: Some(42),
			tenant_id: None,
		}
	}

	#[test]
	fn test_parses_column_equality_with_boolean() {
		let expr = ConditionExpr::parse("is_public = true").unwrap();
		let compiled = expr.compile(&bindings()).unwrap();
		assert_eq!(compiled.sql, "(\"is_public\" = ?)");
		assert_eq!(compiled.params, vec![SqlValue::Bool(true)]);
		assert!(compiled.references_columns);
	}

	#[test]
	fn test_placeholders_become_binds() {
		let expr = ConditionExpr::parse(":user_id = 5 AND :entity_id = 42").unwrap();
		let compiled = expr.compile(&bindings()).unwrap();
		assert_eq!(compiled.sql, "((? = ?) AND (? = ?))");
		assert_eq!(
			compiled.params,
			vec![
				SqlValue::Integer(5),
				SqlValue::Integer(5),
				SqlValue::Integer(42),
				SqlValue::Integer(42),
			]
		);
		assert!(!compiled.references_columns);
	}

	#[test]
	fn test_missing_organization_binds_zero() {
		let expr = ConditionExpr::parse(":organization_id = 0").unwrap();
		let compiled = expr.compile(&bindings()).unwrap();
		assert_eq!(compiled.params[0], SqlValue::Integer(0));
	}

	#[test]
	fn test_missing_entity_binds_null() {
		let mut b = bindings();
		b.entity_id = None;
		let compiled = ConditionExpr::parse(":entity_id IS NULL")
			.unwrap()
			.compile(&b)
			.unwrap();
		assert_eq!(compiled.sql, "(? IS NULL)");
		assert_eq!(compiled.params, vec![SqlValue::Null]);
	}

	#[test]
	fn test_and_binds_tighter_than_or() {
		let expr = ConditionExpr::parse("a = 1 OR b = 2 AND c = 3").unwrap();
		assert!(matches!(expr, ConditionExpr::Or(_, ref r) if matches!(**r, ConditionExpr::And(..))));
	}

	#[test]
	fn test_parses_in_and_not_in_lists() {
		let compiled = ConditionExpr::parse("status NOT IN ('archived', 'deleted')")
			.unwrap()
			.compile(&bindings())
			.unwrap();
		assert_eq!(compiled.sql, "(\"status\" NOT IN (?, ?))");
	}

	#[test]
	fn test_string_literals_escape_quotes() {
		let expr = ConditionExpr::parse("name = 'o''brien'").unwrap();
		let compiled = expr.compile(&bindings()).unwrap();
		assert_eq!(compiled.params, vec![SqlValue::Text("o'brien".to_string())]);
	}

	#[test]
	fn test_rejects_subqueries_and_functions() {
		assert!(ConditionExpr::parse("id IN (SELECT id FROM users)").is_err());
		assert!(ConditionExpr::parse("lower(name) = 'x'").is_err());
		assert!(ConditionExpr::parse("1 = 1; DROP TABLE users").is_err());
		assert!(ConditionExpr::parse("1 = 1 -- comment").is_err());
	}

	#[test]
	fn test_rejects_unknown_placeholder() {
		let err = ConditionExpr::parse(":password = 'x'").unwrap_err();
		assert!(matches!(err, CoreError::ConditionParse { position: 0, .. }));
	}

	#[test]
	fn test_rejects_empty_and_unbalanced_input() {
		assert!(ConditionExpr::parse("").is_err());
		assert!(ConditionExpr::parse("(a = 1").is_err());
		assert!(ConditionExpr::parse("a = 1)").is_err());
		assert!(ConditionExpr::parse("'open").is_err());
	}

	#[test]
	fn test_rejects_excessive_nesting() {
		let deep = format!("{}1 = 1{}", "(".repeat(100), ")".repeat(100));
		assert!(ConditionExpr::parse(&deep).is_err());
	}

	proptest! {
		#[test]
		fn test_integer_literals_never_appear_in_sql(n in any::<i64>()) {
			let condition = format!("amount >= {n}");
			let compiled = ConditionExpr::parse(&condition).unwrap().compile(&bindings()).unwrap();
			prop_assert_eq!(compiled.sql, "(\"amount\" >= ?)".to_string());
			prop_assert_eq!(compiled.params, vec![SqlValue::Integer(n)]);
		}

		#[test]
		fn test_text_literals_never_appear_in_sql(s in "[a-zA-Z0-9 ;-]{0,20}") {
			let condition = format!("name = '{s}'");
			let compiled = ConditionExpr::parse(&condition).unwrap().compile(&bindings()).unwrap();
			prop_assert_eq!(compiled.sql, "(\"name\" = ?)".to_string());
		}
	}
}
