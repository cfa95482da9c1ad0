//! Well-Known-Text reader and writer.
//!
//! Accepts the six simple-feature shapes with optional `Z` ordinates and an
//! optional EWKT `SRID=n;` prefix. `EMPTY` geometries and measured (`M`)
//! ordinates are rejected because the geometry model cannot hold them.

use super::{Coordinate, Geometry, Polygon, Shape};
use crate::errors::{ErrorKind, GeoError};
use std::fmt::Write;
use thiserror::Error;

/// Errors produced while reading WKT text.
#[derive(Debug, Error, PartialEq)]
pub enum WktError {
    #[error("unexpected end of input")]
    UnexpectedEnd,

    #[error("unexpected token '{found}', expected {expected}")]
    UnexpectedToken { found: String, expected: String },

    #[error("unknown geometry type '{0}'")]
    UnknownType(String),

    #[error("unsupported WKT feature '{0}'")]
    Unsupported(String),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("invalid SRID '{0}'")]
    InvalidSrid(String),

    #[error("mixed coordinate dimensions")]
    MixedDimensions,
}

impl From<WktError> for GeoError {
    fn from(err: WktError) -> Self {
        GeoError::new(&format!("Invalid WKT: {}", err), ErrorKind::EncodingError)
    }
}

/// Parses WKT (or EWKT) text into a validated geometry.
///
/// ```rust,ignore
/// let line = parse_wkt("LINESTRING(0 0, 1 1)")?;
/// ```
pub fn parse_wkt(text: &str) -> Result<Geometry, GeoError> {
    let geometry = read_wkt(text).map_err(|e| {
        GeoError::new(
            &format!("Invalid WKT: {} in '{}'", e, text),
            ErrorKind::EncodingError,
        )
    })?;
    geometry.validate()?;
    Ok(geometry)
}

fn read_wkt(text: &str) -> Result<Geometry, WktError> {
    let (srid, body) = split_srid(text.trim())?;
    let mut parser = Parser::new(body)?;
    let shape = parser.geometry()?;
    parser.finish()?;
    Ok(Geometry::new(shape).with_srid(srid))
}

fn split_srid(text: &str) -> Result<(Option<u32>, &str), WktError> {
    let upper_prefix = text.get(..5).map(|p| p.to_ascii_uppercase());
    if upper_prefix.as_deref() != Some("SRID=") {
        return Ok((None, text));
    }
    let Some((prefix, body)) = text.split_once(';') else {
        return Err(WktError::InvalidSrid(text.to_string()));
    };
    let value = prefix[5..].trim();
    let srid = value
        .parse::<u32>()
        .map_err(|_| WktError::InvalidSrid(value.to_string()))?;
    Ok((Some(srid), body))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Number(f64),
    Open,
    Close,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Word(w) => w.clone(),
            Token::Number(n) => n.to_string(),
            Token::Open => "(".into(),
            Token::Close => ")".into(),
            Token::Comma => ",".into(),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, WktError> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                tokens.push(Token::Open);
                chars.next();
            }
            ')' => {
                tokens.push(Token::Close);
                chars.next();
            }
            ',' => {
                tokens.push(Token::Comma);
                chars.next();
            }
            c if c.is_ascii_alphabetic() => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    if !c.is_ascii_alphabetic() {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Word(text[start..end].to_ascii_uppercase()));
            }
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => {
                let mut end = start;
                while let Some(&(i, c)) = chars.peek() {
                    let numeric = c.is_ascii_digit()
                        || matches!(c, '-' | '+' | '.' | 'e' | 'E');
                    if !numeric {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                let raw = &text[start..end];
                let value = raw
                    .parse::<f64>()
                    .map_err(|_| WktError::InvalidNumber(raw.to_string()))?;
                tokens.push(Token::Number(value));
            }
            other => {
                return Err(WktError::UnexpectedToken {
                    found: other.to_string(),
                    expected: "WKT token".into(),
                })
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    has_z: Option<bool>,
}

impl Parser {
    fn new(text: &str) -> Result<Self, WktError> {
        Ok(Parser {
            tokens: tokenize(text)?,
            position: 0,
            has_z: None,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Result<Token, WktError> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or(WktError::UnexpectedEnd)?;
        self.position += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> Result<(), WktError> {
        let token = self.next()?;
        if token == expected {
            Ok(())
        } else {
            Err(WktError::UnexpectedToken {
                found: token.describe(),
                expected: expected.describe(),
            })
        }
    }

    fn finish(&self) -> Result<(), WktError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(WktError::UnexpectedToken {
                found: token.describe(),
                expected: "end of input".into(),
            }),
        }
    }

    fn geometry(&mut self) -> Result<Shape, WktError> {
        let word = match self.next()? {
            Token::Word(w) => w,
            other => {
                return Err(WktError::UnexpectedToken {
                    found: other.describe(),
                    expected: "geometry type".into(),
                })
            }
        };

        match self.peek() {
            Some(Token::Word(w)) if w == "Z" => {
                self.position += 1;
                self.has_z = Some(true);
            }
            Some(Token::Word(w)) if w == "EMPTY" || w == "M" || w == "ZM" => {
                return Err(WktError::Unsupported(w.clone()));
            }
            _ => {}
        }

        match word.as_str() {
            "POINT" => {
                self.expect(Token::Open)?;
                let c = self.coordinate()?;
                self.expect(Token::Close)?;
                Ok(Shape::Point(c))
            }
            "LINESTRING" => Ok(Shape::LineString(self.coordinate_list()?)),
            "POLYGON" => Ok(Shape::Polygon(self.polygon()?)),
            "MULTIPOINT" => Ok(Shape::MultiPoint(self.multi_point()?)),
            "MULTILINESTRING" => {
                let lines = self.list(|p| p.coordinate_list())?;
                Ok(Shape::MultiLineString(lines))
            }
            "MULTIPOLYGON" => Ok(Shape::MultiPolygon(self.list(|p| p.polygon())?)),
            other => Err(WktError::UnknownType(other.to_string())),
        }
    }

    /// `( item, item, ... )`
    fn list<T>(
        &mut self,
        mut item: impl FnMut(&mut Parser) -> Result<T, WktError>,
    ) -> Result<Vec<T>, WktError> {
        self.expect(Token::Open)?;
        let mut items = vec![item(self)?];
        loop {
            match self.next()? {
                Token::Comma => items.push(item(self)?),
                Token::Close => return Ok(items),
                other => {
                    return Err(WktError::UnexpectedToken {
                        found: other.describe(),
                        expected: "',' or ')'".into(),
                    })
                }
            }
        }
    }

    fn coordinate_list(&mut self) -> Result<Vec<Coordinate>, WktError> {
        self.list(|p| p.coordinate())
    }

    fn polygon(&mut self) -> Result<Polygon, WktError> {
        let mut rings = self.list(|p| p.coordinate_list())?;
        let exterior = rings.remove(0);
        Ok(Polygon::new(exterior, rings))
    }

    /// Accepts both `MULTIPOINT((1 2), (3 4))` and `MULTIPOINT(1 2, 3 4)`.
    fn multi_point(&mut self) -> Result<Vec<Coordinate>, WktError> {
        self.list(|p| {
            if p.peek() == Some(&Token::Open) {
                p.position += 1;
                let c = p.coordinate()?;
                p.expect(Token::Close)?;
                Ok(c)
            } else {
                p.coordinate()
            }
        })
    }

    fn coordinate(&mut self) -> Result<Coordinate, WktError> {
        let x = self.number()?;
        let y = self.number()?;
        let z = match self.peek() {
            Some(Token::Number(_)) => Some(self.number()?),
            _ => None,
        };
        match (self.has_z, z.is_some()) {
            (None, dim) => self.has_z = Some(dim),
            (Some(expected), dim) if expected != dim => return Err(WktError::MixedDimensions),
            _ => {}
        }
        Ok(Coordinate { x, y, z })
    }

    fn number(&mut self) -> Result<f64, WktError> {
        match self.next()? {
            Token::Number(n) => Ok(n),
            other => Err(WktError::UnexpectedToken {
                found: other.describe(),
                expected: "number".into(),
            }),
        }
    }
}

/// Renders a geometry as WKT, prefixed with `SRID=n;` when it carries an SRID.
pub fn write_wkt(geometry: &Geometry) -> String {
    let mut out = String::new();
    if let Some(srid) = geometry.srid() {
        let _ = write!(out, "SRID={};", srid);
    }
    let tag = if geometry.has_z() { " Z" } else { "" };
    let name = geometry.kind().name().to_ascii_uppercase();
    let _ = write!(out, "{}{} ", name, tag);

    match geometry.shape() {
        Shape::Point(c) => {
            let _ = write!(out, "({})", c);
        }
        Shape::LineString(cs) => write_coordinates(&mut out, cs),
        Shape::Polygon(p) => write_polygon(&mut out, p),
        Shape::MultiPoint(cs) => {
            out.push('(');
            for (i, c) in cs.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "({})", c);
            }
            out.push(')');
        }
        Shape::MultiLineString(lines) => {
            out.push('(');
            for (i, line) in lines.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_coordinates(&mut out, line);
            }
            out.push(')');
        }
        Shape::MultiPolygon(polys) => {
            out.push('(');
            for (i, p) in polys.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_polygon(&mut out, p);
            }
            out.push(')');
        }
    }
    out
}

fn write_coordinates(out: &mut String, coordinates: &[Coordinate]) {
    out.push('(');
    for (i, c) in coordinates.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{}", c);
    }
    out.push(')');
}

fn write_polygon(out: &mut String, polygon: &Polygon) {
    out.push('(');
    for (i, ring) in polygon.rings().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_coordinates(out, ring);
    }
    out.push(')');
}
