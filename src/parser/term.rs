/*!

  Tokenizer and recursive-descent parser for arithmetic terms and guards,
  shared by the textual front ends. Division is rejected unless explicitly
  enabled, since `x/y` is only sound when the result is integral.

*/

use num_bigint::BigInt;

use crate::config::Config;
use crate::errors::Error;
use crate::expr::{Expr, Guard, RelOp, Relation};
use crate::its::VariableManager;
use crate::Numeric;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
  Ident(String),
  Number(BigInt),
  Plus,
  Minus,
  Star,
  Slash,
  Caret,
  LParen,
  RParen,
  Comma,
  Rel(RelOp),
  AndAnd,
}

fn tokenize(input: &str) -> Result<Vec<Token>, Error> {
  let mut tokens = Vec::new();
  let chars: Vec<char> = input.chars().collect();
  let mut position = 0;

  while position < chars.len() {
    let c = chars[position];
    match c {
      ' ' | '\t' | '\n' | '\r' => position += 1,
      '+' => {
        tokens.push(Token::Plus);
        position += 1;
      }
      '-' => {
        tokens.push(Token::Minus);
        position += 1;
      }
      '*' => {
        tokens.push(Token::Star);
        position += 1;
      }
      '/' => {
        if chars.get(position + 1) == Some(&'\\') {
          // the conjunction symbol /\
          tokens.push(Token::AndAnd);
          position += 2;
        } else {
          tokens.push(Token::Slash);
          position += 1;
        }
      }
      '^' => {
        tokens.push(Token::Caret);
        position += 1;
      }
      '(' => {
        tokens.push(Token::LParen);
        position += 1;
      }
      ')' => {
        tokens.push(Token::RParen);
        position += 1;
      }
      ',' => {
        tokens.push(Token::Comma);
        position += 1;
      }
      '&' => {
        if chars.get(position + 1) == Some(&'&') {
          tokens.push(Token::AndAnd);
          position += 2;
        } else {
          return Err(Error::Parse(format!("stray '&' in `{}`", input)));
        }
      }
      '<' => {
        if chars.get(position + 1) == Some(&'=') {
          tokens.push(Token::Rel(RelOp::Le));
          position += 2;
        } else {
          tokens.push(Token::Rel(RelOp::Lt));
          position += 1;
        }
      }
      '>' => {
        if chars.get(position + 1) == Some(&'=') {
          tokens.push(Token::Rel(RelOp::Ge));
          position += 2;
        } else {
          tokens.push(Token::Rel(RelOp::Gt));
          position += 1;
        }
      }
      '=' => {
        if chars.get(position + 1) == Some(&'=') {
          position += 2;
        } else {
          position += 1;
        }
        tokens.push(Token::Rel(RelOp::Eq));
      }
      '!' => {
        if chars.get(position + 1) == Some(&'=') {
          tokens.push(Token::Rel(RelOp::Neq));
          position += 2;
        } else {
          return Err(Error::Parse(format!("stray '!' in `{}`", input)));
        }
      }
      _ if c.is_ascii_digit() => {
        let start = position;
        while position < chars.len() && chars[position].is_ascii_digit() {
          position += 1;
        }
        let literal: String = chars[start..position].iter().collect();
        let value = literal
            .parse::<BigInt>()
            .map_err(|_| Error::Parse(format!("bad number `{}`", literal)))?;
        tokens.push(Token::Number(value));
      }
      _ if c.is_ascii_alphabetic() || c == '_' || c == '\'' || c == '.' => {
        let start = position;
        while position < chars.len()
            && (chars[position].is_ascii_alphanumeric()
                || chars[position] == '_'
                || chars[position] == '\''
                || chars[position] == '.')
        {
          position += 1;
        }
        tokens.push(Token::Ident(chars[start..position].iter().collect()));
      }
      other => return Err(Error::Parse(format!("unexpected character `{}`", other))),
    }
  }
  Ok(tokens)
}

/// Parses terms and guards over a variable manager. Identifiers that are
/// not yet known become tracked variables; the caller decides afterwards
/// which of them are temporary.
pub struct TermParser<'a> {
  tokens        : Vec<Token>,
  position      : usize,
  vm            : &'a mut VariableManager,
  allow_division: bool,
}

impl<'a> TermParser<'a> {
  pub fn new(input: &str, vm: &'a mut VariableManager, config: &Config) -> Result<TermParser<'a>, Error> {
    Ok(TermParser {
      tokens        : tokenize(input)?,
      position      : 0,
      vm,
      allow_division: config.allow_division,
    })
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.position)
  }

  fn next(&mut self) -> Option<Token> {
    let token = self.tokens.get(self.position).cloned();
    if token.is_some() {
      self.position += 1;
    }
    token
  }

  fn expect(&mut self, token: Token) -> Result<(), Error> {
    match self.next() {
      Some(found) if found == token => Ok(()),
      found => Err(Error::Parse(format!("expected {:?}, found {:?}", token, found))),
    }
  }

  pub fn at_end(&self) -> bool {
    self.position >= self.tokens.len()
  }

  // region Expressions

  pub fn expression(&mut self) -> Result<Expr, Error> {
    let mut result = self.product()?;
    loop {
      match self.peek() {
        Some(Token::Plus)  => {
          self.next();
          result = result + self.product()?;
        }
        Some(Token::Minus) => {
          self.next();
          result = result - self.product()?;
        }
        _ => return Ok(result),
      }
    }
  }

  fn product(&mut self) -> Result<Expr, Error> {
    let mut result = self.power()?;
    loop {
      match self.peek() {
        Some(Token::Star)  => {
          self.next();
          result = result * self.power()?;
        }
        Some(Token::Slash) => {
          if !self.allow_division {
            return Err(Error::DivisionNotAllowed);
          }
          self.next();
          let divisor = self.power()?;
          result = result * Expr::pow(divisor, Expr::int(-1));
        }
        _ => return Ok(result),
      }
    }
  }

  fn power(&mut self) -> Result<Expr, Error> {
    if self.peek() == Some(&Token::Minus) {
      self.next();
      return Ok(-self.power()?);
    }
    let base = self.atom()?;
    if self.peek() == Some(&Token::Caret) {
      self.next();
      let exponent = self.power()?;
      Ok(Expr::pow(base, exponent))
    } else {
      Ok(base)
    }
  }

  fn atom(&mut self) -> Result<Expr, Error> {
    match self.next() {
      Some(Token::Number(value)) => Ok(Expr::num(Numeric::from_integer(value))),
      Some(Token::Ident(name))   => {
        let var = self.vm.get_or_add_variable(&name);
        Ok(Expr::var(var))
      }
      Some(Token::LParen)        => {
        let inner = self.expression()?;
        self.expect(Token::RParen)?;
        Ok(inner)
      }
      found => Err(Error::Parse(format!("unexpected token {:?} in expression", found))),
    }
  }

  // endregion

  // region Guards

  fn relation(&mut self) -> Result<Relation, Error> {
    let lhs = self.expression()?;
    let op = match self.next() {
      Some(Token::Rel(op)) => op,
      found                => {
        return Err(Error::Parse(format!("expected a relation, found {:?}", found)));
      }
    };
    let rhs = self.expression()?;
    Ok(Relation::new(lhs, op, rhs))
  }

  /// A conjunction of relations, separated by `&&`, `/\` or commas.
  /// Disequalities are rejected: they have no conjunctive normal form.
  pub fn guard(&mut self) -> Result<Guard, Error> {
    let mut guard = Guard::empty();
    loop {
      let relation = self.relation()?;
      if relation.op() == RelOp::Neq {
        return Err(Error::Parse(format!(
          "disequalities are not supported in guards: `{}`",
          relation
        )));
      }
      guard.push(relation);
      match self.peek() {
        Some(Token::AndAnd) | Some(Token::Comma) => {
          self.next();
        }
        _ => return Ok(guard),
      }
    }
  }

  // endregion
}

/// Convenience wrapper: parses a single arithmetic expression.
pub fn parse_expression(
  input: &str,
  vm: &mut VariableManager,
  config: &Config,
) -> Result<Expr, Error> {
  let mut parser = TermParser::new(input, vm, config)?;
  let result = parser.expression()?;
  if !parser.at_end() {
    return Err(Error::Parse(format!("trailing input in `{}`", input)));
  }
  Ok(result)
}

/// Convenience wrapper: parses a conjunctive guard.
pub fn parse_guard(input: &str, vm: &mut VariableManager, config: &Config) -> Result<Guard, Error> {
  let mut parser = TermParser::new(input, vm, config)?;
  let result = parser.guard()?;
  if !parser.at_end() {
    return Err(Error::Parse(format!("trailing input in `{}`", input)));
  }
  Ok(result)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn arithmetic_precedence() {
    let mut vm = VariableManager::new();
    let config = Config::default();
    let parsed = parse_expression("2*x + y^2 - 3", &mut vm, &config).unwrap();
    let x = vm.find_variable("x").unwrap();
    let y = vm.find_variable("y").unwrap();
    let expected =
        Expr::int(2) * Expr::var(x) + Expr::pow(Expr::var(y), Expr::int(2)) - Expr::int(3);
    assert_eq!(parsed, expected);
  }

  #[test]
  fn division_is_rejected_by_default() {
    let mut vm = VariableManager::new();
    let config = Config::default();
    assert!(matches!(
      parse_expression("x / 2", &mut vm, &config),
      Err(Error::DivisionNotAllowed)
    ));

    let permissive = Config { allow_division: true, ..Config::default() };
    assert!(parse_expression("x / 2", &mut vm, &permissive).is_ok());
  }

  #[test]
  fn guard_conjunctions() {
    let mut vm = VariableManager::new();
    let config = Config::default();
    let guard = parse_guard("x > 0 && y >= x, z = 3", &mut vm, &config).unwrap();
    assert_eq!(guard.len(), 3);
    assert_eq!(guard[2].op(), RelOp::Eq);
  }

  #[test]
  fn unary_minus() {
    let mut vm = VariableManager::new();
    let config = Config::default();
    let parsed = parse_expression("-x + (-2)", &mut vm, &config).unwrap();
    let x = vm.find_variable("x").unwrap();
    assert_eq!(parsed, (-Expr::var(x) - Expr::int(2)).expand());
  }
}
