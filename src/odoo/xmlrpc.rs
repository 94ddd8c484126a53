//! Minimal XML-RPC codec.
//!
//! Requests are rendered as text with escaped scalars; responses are read with
//! quick-xml into a flat token stream and parsed by recursive descent. Values
//! travel as [`serde_json::Value`] so remote results can be handed to MCP
//! clients without another conversion step.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use serde_json::{Map, Number, Value};

/// A `<fault>` returned by the remote server
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    /// `faultCode`, stringified (Odoo sends either integers or strings)
    pub code: String,

    /// `faultString`, usually including the server-side traceback
    pub message: String,
}

/// Decoded `<methodResponse>`
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    Success(Value),
    Fault(Fault),
}

/// The response body could not be understood as XML-RPC
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("malformed XML-RPC response: {0}")]
pub struct ParseError(pub String);

/// Render a `<methodCall>` document.
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(256);
    out.push_str("<?xml version=\"1.0\"?><methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        encode_value(param, &mut out);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

fn encode_value(value: &Value, out: &mut String) {
    out.push_str("<value>");
    match value {
        Value::Null => out.push_str("<nil/>"),
        Value::Bool(b) => {
            out.push_str("<boolean>");
            out.push(if *b { '1' } else { '0' });
            out.push_str("</boolean>");
        }
        Value::Number(n) => encode_number(n, out),
        Value::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(item, out);
            }
            out.push_str("</data></array>");
        }
        Value::Object(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                encode_value(member, out);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

fn encode_number(n: &Number, out: &mut String) {
    if let Some(i) = n.as_i64() {
        if i32::try_from(i).is_ok() {
            out.push_str(&format!("<int>{}</int>", i));
        } else {
            out.push_str(&format!("<i8>{}</i8>", i));
        }
    } else if let Some(f) = n.as_f64() {
        // u64 values above i64::MAX land here too
        out.push_str(&format!("<double>{}</double>", f));
    }
}

/// Parse a `<methodResponse>` document.
pub fn decode_response(xml: &str) -> Result<MethodResponse, ParseError> {
    let tokens = tokenize(xml)?;
    let mut parser = Parser { tokens, pos: 0 };

    parser.open("methodResponse")?;
    let response = match parser.next_significant()? {
        Token::Open(name) if name == "params" => {
            parser.open("param")?;
            parser.open("value")?;
            let value = parser.value()?;
            parser.close("param")?;
            parser.close("params")?;
            MethodResponse::Success(value)
        }
        // Some servers answer `None`-returning methods with an empty <params/>
        Token::Empty(name) if name == "params" => MethodResponse::Success(Value::Null),
        Token::Open(name) if name == "fault" => {
            parser.open("value")?;
            let fault = parser.value()?;
            parser.close("fault")?;
            MethodResponse::Fault(fault_from_value(fault))
        }
        other => return Err(ParseError(format!("unexpected {:?} in methodResponse", other))),
    };
    parser.close("methodResponse")?;

    Ok(response)
}

fn fault_from_value(value: Value) -> Fault {
    let code = match value.get("faultCode") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let message = value
        .get("faultString")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Fault { code, message }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open(String),
    Close(String),
    Empty(String),
    Text(String),
}

fn tokenize(xml: &str) -> Result<Vec<Token>, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut tokens = Vec::new();

    loop {
        let token = match reader.read_event() {
            Ok(Event::Start(e)) => Token::Open(tag_name(e.name().as_ref())),
            Ok(Event::End(e)) => Token::Close(tag_name(e.name().as_ref())),
            Ok(Event::Empty(e)) => Token::Empty(tag_name(e.name().as_ref())),
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| ParseError(format!("bad text content: {}", e)))?;
                Token::Text(text.into_owned())
            }
            Ok(Event::CData(e)) => Token::Text(String::from_utf8_lossy(&e.into_inner()).into_owned()),
            Ok(Event::Eof) => break,
            // Declarations, comments, processing instructions, doctype
            Ok(_) => continue,
            Err(e) => return Err(ParseError(format!("XML parsing error: {}", e))),
        };

        // Entity references may split text into several events
        if let (Token::Text(more), Some(Token::Text(prev))) = (&token, tokens.last_mut()) {
            prev.push_str(more);
            continue;
        }
        tokens.push(token);
    }

    Ok(tokens)
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn next(&mut self) -> Result<Token, ParseError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| ParseError("unexpected end of document".to_string()))?;
        self.pos += 1;
        Ok(token)
    }

    /// Next token that is not whitespace-only text
    fn next_significant(&mut self) -> Result<Token, ParseError> {
        loop {
            match self.next()? {
                Token::Text(t) if t.trim().is_empty() => continue,
                token => return Ok(token),
            }
        }
    }

    fn open(&mut self, expected: &str) -> Result<(), ParseError> {
        match self.next_significant()? {
            Token::Open(name) if name == expected => Ok(()),
            other => Err(ParseError(format!("expected <{}>, found {:?}", expected, other))),
        }
    }

    fn close(&mut self, expected: &str) -> Result<(), ParseError> {
        match self.next_significant()? {
            Token::Close(name) if name == expected => Ok(()),
            other => Err(ParseError(format!("expected </{}>, found {:?}", expected, other))),
        }
    }

    /// Text content up to the closing tag (the opening tag is already consumed)
    fn text(&mut self, tag: &str) -> Result<String, ParseError> {
        let mut text = String::new();
        loop {
            match self.next()? {
                Token::Text(t) => text.push_str(&t),
                Token::Close(name) if name == tag => return Ok(text),
                other => {
                    return Err(ParseError(format!("unexpected {:?} inside <{}>", other, tag)))
                }
            }
        }
    }

    /// Parse the body of a `<value>` whose opening tag is already consumed.
    fn value(&mut self) -> Result<Value, ParseError> {
        let mut text = String::new();
        loop {
            match self.next()? {
                Token::Text(t) => text.push_str(&t),
                // Untyped values are strings
                Token::Close(name) if name == "value" => return Ok(Value::String(text)),
                Token::Open(name) => {
                    let value = self.typed(&name)?;
                    self.close("value")?;
                    return Ok(value);
                }
                Token::Empty(name) => {
                    let value = empty_typed(&name)?;
                    self.close("value")?;
                    return Ok(value);
                }
                other => return Err(ParseError(format!("unexpected {:?} inside <value>", other))),
            }
        }
    }

    fn typed(&mut self, tag: &str) -> Result<Value, ParseError> {
        match tag {
            "int" | "i4" | "i8" => {
                let text = self.text(tag)?;
                text.trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| ParseError(format!("invalid integer '{}'", text)))
            }
            "boolean" => match self.text(tag)?.trim() {
                "1" | "true" => Ok(Value::Bool(true)),
                "0" | "false" => Ok(Value::Bool(false)),
                other => Err(ParseError(format!("invalid boolean '{}'", other))),
            },
            "double" => {
                let text = self.text(tag)?;
                text.trim()
                    .parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(|| ParseError(format!("invalid double '{}'", text)))
            }
            "string" | "dateTime.iso8601" => Ok(Value::String(self.text(tag)?)),
            "base64" => Ok(Value::String(self.text(tag)?.trim().to_string())),
            "nil" => {
                self.close("nil")?;
                Ok(Value::Null)
            }
            "array" => self.array(),
            "struct" => self.structure(),
            other => Err(ParseError(format!("unsupported value type <{}>", other))),
        }
    }

    fn array(&mut self) -> Result<Value, ParseError> {
        let mut items = Vec::new();
        match self.next_significant()? {
            Token::Empty(name) if name == "data" => {}
            Token::Open(name) if name == "data" => loop {
                match self.next_significant()? {
                    Token::Open(name) if name == "value" => items.push(self.value()?),
                    Token::Empty(name) if name == "value" => items.push(Value::String(String::new())),
                    Token::Close(name) if name == "data" => break,
                    other => return Err(ParseError(format!("unexpected {:?} inside <data>", other))),
                }
            },
            other => return Err(ParseError(format!("expected <data>, found {:?}", other))),
        }
        self.close("array")?;
        Ok(Value::Array(items))
    }

    fn structure(&mut self) -> Result<Value, ParseError> {
        let mut members = Map::new();
        loop {
            match self.next_significant()? {
                Token::Open(name) if name == "member" => {
                    self.open("name")?;
                    let key = self.text("name")?;
                    let value = match self.next_significant()? {
                        Token::Open(name) if name == "value" => self.value()?,
                        Token::Empty(name) if name == "value" => Value::String(String::new()),
                        other => {
                            return Err(ParseError(format!("expected <value>, found {:?}", other)))
                        }
                    };
                    self.close("member")?;
                    members.insert(key, value);
                }
                Token::Close(name) if name == "struct" => return Ok(Value::Object(members)),
                other => return Err(ParseError(format!("unexpected {:?} inside <struct>", other))),
            }
        }
    }
}

fn empty_typed(tag: &str) -> Result<Value, ParseError> {
    match tag {
        "string" | "base64" | "dateTime.iso8601" => Ok(Value::String(String::new())),
        "nil" => Ok(Value::Null),
        "array" => Ok(Value::Array(Vec::new())),
        "struct" => Ok(Value::Object(Map::new())),
        other => Err(ParseError(format!("empty <{}/> has no value", other))),
    }
}
