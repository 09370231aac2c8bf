//! Bit-exact round-trip between [`Value`] and the project file's value XML
//! grammar (§6). Parsing uses `roxmltree`'s read-only DOM (the whole document
//! is available up front, which this grammar's nested-children style wants);
//! serialization uses `quick-xml`'s streaming writer.

use super::{Matrix, Table, Value};
use crate::error::{KernelError, Result};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use roxmltree::Node;
use std::collections::BTreeMap;
use std::io::Cursor;

/// Parses a single value element (the root of a standalone value document, or
/// a child of `<set>`/`<map>`/`<matrix>`).
pub fn parse_value(node: Node) -> Result<Value> {
    match node.tag_name().name() {
        "boolean" => {
            let text = node.text().unwrap_or("").trim();
            match text {
                "true" | "1" => Ok(Value::Boolean(true)),
                "false" | "0" => Ok(Value::Boolean(false)),
                other => Err(KernelError::config(format!(
                    "invalid <boolean> text '{other}'"
                ))),
            }
        }
        "integer" => {
            let text = node.text().unwrap_or("").trim();
            text.parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| KernelError::config(format!("invalid <integer> text: {e}")))
        }
        "double" => {
            let text = node.text().unwrap_or("").trim();
            text.parse::<f64>()
                .map(Value::Double)
                .map_err(|e| KernelError::config(format!("invalid <double> text: {e}")))
        }
        "string" => Ok(Value::String(node.text().unwrap_or("").to_string())),
        "set" => {
            let mut items = Vec::new();
            for child in node.children().filter(|n| n.is_element()) {
                items.push(parse_value(child)?);
            }
            Ok(Value::Set(items))
        }
        "map" => {
            let mut map = BTreeMap::new();
            for key_node in node
                .children()
                .filter(|n| n.is_element() && n.tag_name().name() == "key")
            {
                let name = key_node.attribute("name").ok_or_else(|| {
                    KernelError::config("<key> element missing required 'name' attribute")
                })?;
                let value_node = key_node
                    .children()
                    .find(|n| n.is_element())
                    .ok_or_else(|| KernelError::config(format!("<key name=\"{name}\"> has no value child")))?;
                map.insert(name.to_string(), parse_value(value_node)?);
            }
            Ok(Value::Map(map))
        }
        "tuple" => {
            let text = node.text().unwrap_or("");
            let doubles: std::result::Result<Vec<f64>, _> =
                text.split_whitespace().map(|s| s.parse::<f64>()).collect();
            doubles
                .map(Value::Tuple)
                .map_err(|e| KernelError::config(format!("invalid <tuple> text: {e}")))
        }
        "table" => {
            let width: usize = attr_parse(node, "width")?;
            let height: usize = attr_parse(node, "height")?;
            let text = node.text().unwrap_or("");
            let doubles: std::result::Result<Vec<f64>, _> =
                text.split_whitespace().map(|s| s.parse::<f64>()).collect();
            let data = doubles
                .map_err(|e| KernelError::config(format!("invalid <table> text: {e}")))?;
            if data.len() != width * height {
                return Err(KernelError::config(format!(
                    "<table> declares {width}x{height} but has {} values",
                    data.len()
                )));
            }
            Ok(Value::Table(Table::new(width, height, data)))
        }
        "matrix" => {
            let rows: usize = attr_parse(node, "rows")?;
            let columns: usize = attr_parse(node, "columns")?;
            let mut matrix = Matrix::new(rows, columns);
            matrix.columnmax = attr_parse_or(node, "columnmax", columns);
            matrix.rowmax = attr_parse_or(node, "rowmax", rows);
            matrix.columnstep = attr_parse_or(node, "columnstep", 0.0);
            matrix.rowstep = attr_parse_or(node, "rowstep", 0.0);

            let children: Vec<Node> = node.children().filter(|n| n.is_element()).collect();
            if children.len() != rows * columns {
                return Err(KernelError::config(format!(
                    "<matrix> declares {rows}x{columns} cells but has {} children",
                    children.len()
                )));
            }
            // Column-major order: column 0's rows, then column 1's rows, ...
            let mut it = children.into_iter();
            for col in 0..columns {
                for row in 0..rows {
                    let child = it.next().unwrap();
                    let value = if child.tag_name().name() == "null" {
                        Value::Null
                    } else {
                        parse_value(child)?
                    };
                    matrix.set(col, row, value);
                }
            }
            Ok(Value::Matrix(matrix))
        }
        "xml" => Ok(Value::Xml(node.text().unwrap_or("").to_string())),
        "null" => Ok(Value::Null),
        other => Err(KernelError::config(format!(
            "unknown value element <{other}>"
        ))),
    }
}

fn attr_parse<T: std::str::FromStr>(node: Node, name: &str) -> Result<T> {
    node.attribute(name)
        .ok_or_else(|| KernelError::config(format!("missing required attribute '{name}'")))?
        .parse()
        .map_err(|_| KernelError::config(format!("attribute '{name}' is not a valid number")))
}

fn attr_parse_or<T: std::str::FromStr>(node: Node, name: &str, default: T) -> T {
    node.attribute(name)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Parses a standalone value document (a single root element as described
/// above).
pub fn value_from_xml_str(xml: &str) -> Result<Value> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| KernelError::config(format!("malformed value XML: {e}")))?;
    parse_value(doc.root_element())
}

/// Serializes a [`Value`] back into the XML grammar of §6. Paired with
/// [`value_from_xml_str`], this round-trips bit-exactly for every subtype.
pub fn value_to_xml_string(value: &Value) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    write_value(&mut writer, value)?;
    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| KernelError::config(format!("non-utf8 XML output: {e}")))
}

fn write_value(writer: &mut Writer<Cursor<Vec<u8>>>, value: &Value) -> Result<()> {
    let io_err = |e: quick_xml::Error| KernelError::config(format!("XML write error: {e}"));
    match value {
        Value::Null => {
            writer
                .write_event(Event::Empty(BytesStart::new("null")))
                .map_err(io_err)?;
        }
        Value::Boolean(b) => write_text_elem(writer, "boolean", if *b { "true" } else { "false" })?,
        Value::Integer(i) => write_text_elem(writer, "integer", &i.to_string())?,
        Value::Double(d) => write_text_elem(writer, "double", &format!("{d}"))?,
        Value::String(s) => write_text_elem(writer, "string", s)?,
        Value::Xml(s) => write_text_elem(writer, "xml", s)?,
        Value::Tuple(values) => {
            let text = values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            write_text_elem(writer, "tuple", &text)?;
        }
        Value::Set(items) => {
            writer
                .write_event(Event::Start(BytesStart::new("set")))
                .map_err(io_err)?;
            for item in items {
                write_value(writer, item)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("set")))
                .map_err(io_err)?;
        }
        Value::Map(map) => {
            writer
                .write_event(Event::Start(BytesStart::new("map")))
                .map_err(io_err)?;
            for (name, v) in map {
                let mut key = BytesStart::new("key");
                key.push_attribute(("name", name.as_str()));
                writer.write_event(Event::Start(key)).map_err(io_err)?;
                write_value(writer, v)?;
                writer
                    .write_event(Event::End(BytesEnd::new("key")))
                    .map_err(io_err)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new("map")))
                .map_err(io_err)?;
        }
        Value::Table(table) => {
            let mut start = BytesStart::new("table");
            start.push_attribute(("width", table.width.to_string().as_str()));
            start.push_attribute(("height", table.height.to_string().as_str()));
            writer.write_event(Event::Start(start)).map_err(io_err)?;
            let text = table
                .data
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            writer
                .write_event(Event::Text(BytesText::new(&text)))
                .map_err(io_err)?;
            writer
                .write_event(Event::End(BytesEnd::new("table")))
                .map_err(io_err)?;
        }
        Value::Matrix(matrix) => {
            let mut start = BytesStart::new("matrix");
            start.push_attribute(("rows", matrix.rows.to_string().as_str()));
            start.push_attribute(("columns", matrix.columns.to_string().as_str()));
            start.push_attribute(("columnmax", matrix.columnmax.to_string().as_str()));
            start.push_attribute(("rowmax", matrix.rowmax.to_string().as_str()));
            start.push_attribute(("columnstep", matrix.columnstep.to_string().as_str()));
            start.push_attribute(("rowstep", matrix.rowstep.to_string().as_str()));
            writer.write_event(Event::Start(start)).map_err(io_err)?;
            for col in 0..matrix.columns {
                for row in 0..matrix.rows {
                    write_value(writer, matrix.get(col, row))?;
                }
            }
            writer
                .write_event(Event::End(BytesEnd::new("matrix")))
                .map_err(io_err)?;
        }
    }
    Ok(())
}

fn write_text_elem(writer: &mut Writer<Cursor<Vec<u8>>>, tag: &str, text: &str) -> Result<()> {
    let io_err = |e: quick_xml::Error| KernelError::config(format!("XML write error: {e}"));
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .map_err(io_err)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(io_err)?;
    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(io_err)?;
    Ok(())
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Xml(s) => write!(f, "{s}"),
            Value::Tuple(values) => write!(
                f,
                "{}",
                values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
            Value::Table(t) => write!(f, "{t}"),
            Value::Set(items) => write!(
                f,
                "[{}]",
                items
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            ),
            Value::Map(_) => write!(f, "<map>"),
            Value::Matrix(_) => write!(f, "<matrix>"),
        }
    }
}
