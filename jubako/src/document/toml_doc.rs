//! TOML documents with comment-preserving patch application.

use serde_json::{Map, Number, Value};
use toml_edit::{Array, ArrayOfTables, DocumentMut, InlineTable, Item, Table};

use super::{Document, DocumentFormat, PatchOp, PatchSet, is_blank, object_root};
use crate::{JubakoError, JubakoResult, jsonptr};

/// TOML format handler.
///
/// [`Document::apply`] edits the original text in place, so comments,
/// key order and table layout survive a save.
#[derive(Clone, Copy, Debug, Default)]
pub struct TomlDocument;

impl Document for TomlDocument {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Toml
    }

    fn parse(&self, bytes: &[u8]) -> JubakoResult<Value> {
        if is_blank(bytes) {
            return object_root(DocumentFormat::Toml, Value::Null);
        }
        let text = utf8(bytes)?;
        let table: toml::Table =
            toml::from_str(text).map_err(|err| JubakoError::parse(DocumentFormat::Toml, err))?;
        Ok(Value::Object(
            table.into_iter().map(|(k, v)| (k, to_json(v))).collect(),
        ))
    }

    fn marshal(&self, value: &Value) -> JubakoResult<Vec<u8>> {
        let Value::Object(map) = value else {
            return Err(JubakoError::parse(
                DocumentFormat::Toml,
                "document root must be a table",
            ));
        };
        let table: toml::Table = map
            .iter()
            .filter_map(|(k, v)| from_json(v).map(|v| (k.clone(), v)))
            .collect();
        toml::to_string_pretty(&table)
            .map(String::into_bytes)
            .map_err(|err| JubakoError::parse(DocumentFormat::Toml, err))
    }

    fn apply(&self, original: &[u8], patches: &PatchSet) -> JubakoResult<Vec<u8>> {
        let text = utf8(original)?;
        let mut doc: DocumentMut = text
            .parse()
            .map_err(|err| JubakoError::parse(DocumentFormat::Toml, err))?;
        for patch in patches {
            let keys = jsonptr::parse(&patch.path)?;
            if keys.is_empty() {
                return Err(JubakoError::invalid_path(
                    &patch.path,
                    "cannot patch the document root",
                ));
            }
            match (patch.op, &patch.value) {
                (PatchOp::Add | PatchOp::Replace, Some(value)) if !value.is_null() => {
                    set_in(doc.as_item_mut(), &keys, value)
                        .map_err(|reason| JubakoError::invalid_path(&patch.path, reason))?;
                }
                _ => {
                    remove_in(doc.as_item_mut(), &keys);
                }
            }
        }
        Ok(doc.to_string().into_bytes())
    }
}

fn utf8(bytes: &[u8]) -> JubakoResult<&str> {
    std::str::from_utf8(bytes).map_err(|err| JubakoError::parse(DocumentFormat::Toml, err))
}

fn to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => items.into_iter().map(to_json).collect(),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, to_json(v)))
                .collect::<Map<_, _>>(),
        ),
    }
}

/// TOML has no null; `None` drops the value.
fn from_json(value: &Value) -> Option<toml::Value> {
    Some(match value {
        Value::Null => return None,
        Value::Bool(b) => toml::Value::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => toml::Value::Integer(i),
            None => toml::Value::Float(n.as_f64()?),
        },
        Value::String(s) => toml::Value::String(s.clone()),
        Value::Array(items) => toml::Value::Array(items.iter().filter_map(from_json).collect()),
        Value::Object(map) => toml::Value::Table(
            map.iter()
                .filter_map(|(k, v)| from_json(v).map(|v| (k.clone(), v)))
                .collect(),
        ),
    })
}

fn to_value(value: &Value) -> Result<toml_edit::Value, String> {
    Ok(match value {
        Value::Null => return Err("TOML cannot represent null".to_owned()),
        Value::Bool(b) => toml_edit::Value::from(*b),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => toml_edit::Value::from(i),
            (None, Some(f)) => toml_edit::Value::from(f),
            (None, None) => return Err(format!("number {n} is out of range for TOML")),
        },
        Value::String(s) => toml_edit::Value::from(s.as_str()),
        Value::Array(items) => {
            let mut array = Array::new();
            for item in items.iter().filter(|item| !item.is_null()) {
                array.push(to_value(item)?);
            }
            toml_edit::Value::Array(array)
        }
        Value::Object(map) => {
            let mut table = InlineTable::new();
            for (key, item) in map.iter().filter(|(_, item)| !item.is_null()) {
                table.insert(key.as_str(), to_value(item)?);
            }
            toml_edit::Value::InlineTable(table)
        }
    })
}

fn to_table(map: &Map<String, Value>) -> Result<Table, String> {
    let mut table = Table::new();
    for (key, item) in map.iter().filter(|(_, item)| !item.is_null()) {
        table.insert(key.as_str(), to_item(item, false)?);
    }
    Ok(table)
}

/// Objects become standard tables unless the parent is an inline value.
fn to_item(value: &Value, inline: bool) -> Result<Item, String> {
    match value {
        Value::Object(map) if !inline => to_table(map).map(Item::Table),
        other => to_value(other).map(Item::Value),
    }
}

fn index(segment: &str, len: usize) -> Result<usize, String> {
    if segment == "-" {
        return Ok(len);
    }
    match segment.parse::<usize>() {
        Ok(idx) if idx <= len && !(segment.len() > 1 && segment.starts_with('0')) => Ok(idx),
        _ => Err(format!("'{segment}' is not a usable array index")),
    }
}

/// Overwrite `item`, keeping the comments attached to an existing value.
fn replace(item: &mut Item, value: &Value) -> Result<(), String> {
    if let (Item::Table(table), Value::Object(map)) = (&mut *item, value) {
        table.clear();
        for (key, child) in map.iter().filter(|(_, child)| !child.is_null()) {
            table.insert(key.as_str(), to_item(child, false)?);
        }
        return Ok(());
    }
    if let Item::Value(old) = item {
        let decor = old.decor().clone();
        let mut new = to_value(value)?;
        *new.decor_mut() = decor;
        *old = new;
        return Ok(());
    }
    *item = to_item(value, false)?;
    Ok(())
}

fn through_value<R>(slot: &mut toml_edit::Value, f: impl FnOnce(&mut Item) -> R) -> R {
    let mut item = Item::Value(std::mem::replace(slot, toml_edit::Value::from(false)));
    let out = f(&mut item);
    if let Ok(value) = item.into_value() {
        *slot = value;
    }
    out
}

fn through_table<R>(slot: &mut Table, f: impl FnOnce(&mut Item) -> R) -> R {
    let mut item = Item::Table(std::mem::take(slot));
    let out = f(&mut item);
    if let Ok(table) = item.into_table() {
        *slot = table;
    }
    out
}

fn set_in_tables(tables: &mut ArrayOfTables, keys: (&str, &[String]), value: &Value) -> Result<(), String> {
    let (head, rest) = keys;
    let idx = index(head, tables.len())?;
    if rest.is_empty() {
        let Value::Object(map) = value else {
            return Err("an array of tables only holds tables".to_owned());
        };
        let table = to_table(map)?;
        match tables.get_mut(idx) {
            Some(slot) => *slot = table,
            None => tables.push(table),
        }
        return Ok(());
    }
    if idx == tables.len() {
        tables.push(Table::new());
    }
    let slot = tables
        .get_mut(idx)
        .ok_or_else(|| format!("index {idx} is out of range"))?;
    through_table(slot, |item| set_in(item, rest, value))
}

fn set_in_array(array: &mut Array, keys: (&str, &[String]), value: &Value) -> Result<(), String> {
    let (head, rest) = keys;
    let idx = index(head, array.len())?;
    if rest.is_empty() {
        let new = to_value(value)?;
        if idx == array.len() {
            array.push(new);
        } else {
            array.replace(idx, new);
        }
        return Ok(());
    }
    if idx == array.len() {
        array.push(InlineTable::new());
    }
    let slot = array
        .get_mut(idx)
        .ok_or_else(|| format!("index {idx} is out of range"))?;
    through_value(slot, |item| set_in(item, rest, value))
}

fn set_in(item: &mut Item, keys: &[String], value: &Value) -> Result<(), String> {
    let Some((head, rest)) = keys.split_first() else {
        return replace(item, value);
    };
    if let Some(tables) = item.as_array_of_tables_mut() {
        return set_in_tables(tables, (head, rest), value);
    }
    if let Some(array) = item.as_array_mut() {
        return set_in_array(array, (head, rest), value);
    }
    let inline = item.is_value();
    if item.as_table_like().is_none() {
        *item = if inline {
            Item::Value(toml_edit::Value::InlineTable(InlineTable::new()))
        } else {
            Item::Table(Table::new())
        };
    }
    let table = item
        .as_table_like_mut()
        .ok_or_else(|| "expected a table".to_owned())?;
    if table.get(head).is_none_or(Item::is_none) {
        if rest.is_empty() {
            table.insert(head, to_item(value, inline)?);
            return Ok(());
        }
        let container = if inline {
            Item::Value(toml_edit::Value::InlineTable(InlineTable::new()))
        } else {
            Item::Table(Table::new())
        };
        table.insert(head, container);
    }
    let child = table
        .get_mut(head)
        .ok_or_else(|| format!("key '{head}' could not be created"))?;
    set_in(child, rest, value)
}

fn remove_in(item: &mut Item, keys: &[String]) -> bool {
    let Some((head, rest)) = keys.split_first() else {
        return false;
    };
    if let Some(table) = item.as_table_like_mut() {
        if rest.is_empty() {
            return table.remove(head).is_some();
        }
        return table
            .get_mut(head)
            .is_some_and(|child| remove_in(child, rest));
    }
    let Ok(idx) = head.parse::<usize>() else {
        return false;
    };
    if let Some(tables) = item.as_array_of_tables_mut() {
        if rest.is_empty() {
            if idx < tables.len() {
                tables.remove(idx);
                return true;
            }
            return false;
        }
        return tables
            .get_mut(idx)
            .is_some_and(|slot| through_table(slot, |child| remove_in(child, rest)));
    }
    if let Some(array) = item.as_array_mut() {
        if rest.is_empty() {
            if idx < array.len() {
                array.remove(idx);
                return true;
            }
            return false;
        }
        return array
            .get_mut(idx)
            .is_some_and(|slot| through_value(slot, |child| remove_in(child, rest)));
    }
    false
}
