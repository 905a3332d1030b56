//! Lua Table Module
//!
//! Tables are the single structured type: a dense array part for the
//! integer range `1..=n` plus a hash part for everything else, with an
//! optional metatable. Keys normalize the way Lua requires (a float
//! with an exact integer value indexes the same slot as that integer;
//! `nil` and NaN keys are rejected).

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::value::{float_to_integer, FunctionRef, Value};

/// Shared handle to a table
pub type TableRef = Rc<RefCell<LuaTable>>;

/// Create a fresh empty table behind a shared handle
pub fn new_table() -> TableRef {
    Rc::new(RefCell::new(LuaTable::new()))
}

/// A hashable, normalized table key.
///
/// Reference keys keep the original value so iteration can hand the
/// key back; they hash and compare by identity.
#[derive(Clone)]
pub enum TableKey {
    Int(i64),
    /// Non-integral float, keyed by bit pattern
    Float(u64),
    Str(Rc<str>),
    Bool(bool),
    /// Table or function, by identity
    Obj(Value),
}

impl TableKey {
    /// Normalize a value into a key, or report why it cannot index
    pub fn from_value(value: &Value) -> Result<TableKey, &'static str> {
        match value {
            Value::Nil => Err("table index is nil"),
            Value::Boolean(b) => Ok(TableKey::Bool(*b)),
            Value::Integer(i) => Ok(TableKey::Int(*i)),
            Value::Float(f) => {
                if f.is_nan() {
                    Err("table index is NaN")
                } else if let Some(i) = float_to_integer(*f) {
                    Ok(TableKey::Int(i))
                } else {
                    Ok(TableKey::Float(f.to_bits()))
                }
            }
            Value::Str(s) => Ok(TableKey::Str(s.clone())),
            Value::Table(_) | Value::Function(_) => Ok(TableKey::Obj(value.clone())),
        }
    }

    /// Reconstruct the key as a value for iteration
    pub fn to_value(&self) -> Value {
        match self {
            TableKey::Int(i) => Value::Integer(*i),
            TableKey::Float(bits) => Value::Float(f64::from_bits(*bits)),
            TableKey::Str(s) => Value::Str(s.clone()),
            TableKey::Bool(b) => Value::Boolean(*b),
            TableKey::Obj(v) => v.clone(),
        }
    }

    fn obj_addr(value: &Value) -> usize {
        match value {
            Value::Table(t) => Rc::as_ptr(t) as usize,
            Value::Function(FunctionRef::Lua(f)) => Rc::as_ptr(f) as usize,
            Value::Function(FunctionRef::Native(f)) => Rc::as_ptr(f) as usize,
            _ => 0,
        }
    }
}

impl PartialEq for TableKey {
    fn eq(&self, other: &TableKey) -> bool {
        match (self, other) {
            (TableKey::Int(a), TableKey::Int(b)) => a == b,
            (TableKey::Float(a), TableKey::Float(b)) => a == b,
            (TableKey::Str(a), TableKey::Str(b)) => a == b,
            (TableKey::Bool(a), TableKey::Bool(b)) => a == b,
            (TableKey::Obj(a), TableKey::Obj(b)) => {
                TableKey::obj_addr(a) == TableKey::obj_addr(b)
            }
            _ => false,
        }
    }
}

impl Eq for TableKey {}

impl Hash for TableKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            TableKey::Int(i) => {
                0u8.hash(state);
                i.hash(state);
            }
            TableKey::Float(bits) => {
                1u8.hash(state);
                bits.hash(state);
            }
            TableKey::Str(s) => {
                2u8.hash(state);
                s.hash(state);
            }
            TableKey::Bool(b) => {
                3u8.hash(state);
                b.hash(state);
            }
            TableKey::Obj(v) => {
                4u8.hash(state);
                TableKey::obj_addr(v).hash(state);
            }
        }
    }
}

/// The table itself: array part, hash part, metatable
pub struct LuaTable {
    /// Values for keys `1..=array.len()`; the last slot is never nil,
    /// though interior slots may be
    array: Vec<Value>,
    hash: HashMap<TableKey, Value>,
    metatable: Option<TableRef>,
    /// Hash-part key order snapshot for `next`; cleared whenever a new
    /// hash key appears so the next traversal rebuilds it
    iter_keys: Option<Rc<Vec<TableKey>>>,
}

impl Default for LuaTable {
    fn default() -> Self {
        LuaTable::new()
    }
}

impl LuaTable {
    pub fn new() -> Self {
        LuaTable {
            array: Vec::new(),
            hash: HashMap::new(),
            metatable: None,
            iter_keys: None,
        }
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.clone()
    }

    pub fn set_metatable(&mut self, mt: Option<TableRef>) {
        self.metatable = mt;
    }

    /// Raw read without metamethods
    pub fn get(&self, key: &Value) -> Value {
        let key = match TableKey::from_value(key) {
            Ok(k) => k,
            Err(_) => return Value::Nil,
        };
        self.get_key(&key)
    }

    fn get_key(&self, key: &TableKey) -> Value {
        if let TableKey::Int(i) = key {
            if *i >= 1 && (*i as usize) <= self.array.len() {
                return self.array[*i as usize - 1].clone();
            }
        }
        self.hash.get(key).cloned().unwrap_or(Value::Nil)
    }

    /// Raw write without metamethods; rejects nil and NaN keys
    pub fn set(&mut self, key: Value, value: Value) -> Result<(), &'static str> {
        let key = TableKey::from_value(&key)?;
        self.set_key(key, value);
        Ok(())
    }

    fn set_key(&mut self, key: TableKey, value: Value) {
        if let TableKey::Int(i) = key {
            let len = self.array.len() as i64;
            if i >= 1 && i <= len {
                self.array[i as usize - 1] = value;
                if i == len {
                    self.trim_array_tail();
                }
                return;
            }
            if i == len + 1 && !value.is_nil() {
                self.array.push(value);
                self.migrate_from_hash();
                return;
            }
        }
        if value.is_nil() {
            self.hash.remove(&key);
        } else {
            if !self.hash.contains_key(&key) {
                self.iter_keys = None;
            }
            self.hash.insert(key, value);
        }
    }

    /// Drop trailing nils so the array border stays valid
    fn trim_array_tail(&mut self) {
        while matches!(self.array.last(), Some(Value::Nil)) {
            self.array.pop();
        }
    }

    /// Pull keys that now extend the array range out of the hash part
    fn migrate_from_hash(&mut self) {
        loop {
            let next = TableKey::Int(self.array.len() as i64 + 1);
            match self.hash.remove(&next) {
                Some(v) => self.array.push(v),
                None => break,
            }
        }
    }

    /// The `#` border: the array part length
    pub fn len(&self) -> i64 {
        self.array.len() as i64
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty() && self.hash.is_empty()
    }

    /// Shift-insert into the array part at `pos` (1-based)
    pub fn insert(&mut self, pos: i64, value: Value) -> Result<(), &'static str> {
        let len = self.array.len() as i64;
        if pos < 1 || pos > len + 1 {
            return Err("position out of bounds");
        }
        self.array.insert(pos as usize - 1, value);
        self.migrate_from_hash();
        self.trim_array_tail();
        Ok(())
    }

    /// Shift-remove from the array part at `pos` (1-based)
    pub fn remove(&mut self, pos: i64) -> Result<Value, &'static str> {
        let len = self.array.len() as i64;
        if len == 0 && (pos == 0 || pos == 1) {
            return Ok(Value::Nil);
        }
        if pos < 1 || pos > len + 1 {
            return Err("position out of bounds");
        }
        if pos == len + 1 {
            return Ok(Value::Nil);
        }
        let removed = self.array.remove(pos as usize - 1);
        self.trim_array_tail();
        Ok(removed)
    }

    /// Stateless iteration step. `nil` starts a traversal; each call
    /// returns the following key/value pair, or `None` at the end.
    pub fn next(&mut self, key: &Value) -> Result<Option<(Value, Value)>, &'static str> {
        match key {
            Value::Nil => Ok(self.advance_array(0)),
            _ => {
                let key = TableKey::from_value(key).map_err(|_| "invalid key to 'next'")?;
                if let TableKey::Int(i) = key {
                    if i >= 1 && (i as usize) <= self.array.len() {
                        return Ok(self.advance_array(i as usize));
                    }
                }
                self.advance_hash(&key)
            }
        }
    }

    /// First non-nil array entry at index > `from`, else the start of
    /// the hash part
    fn advance_array(&mut self, from: usize) -> Option<(Value, Value)> {
        for idx in from..self.array.len() {
            if !self.array[idx].is_nil() {
                return Some((Value::Integer(idx as i64 + 1), self.array[idx].clone()));
            }
        }
        let keys = self.snapshot_keys();
        self.hash_pair_from(&keys, 0)
    }

    fn advance_hash(&mut self, after: &TableKey) -> Result<Option<(Value, Value)>, &'static str> {
        let keys = self.snapshot_keys();
        match keys.iter().position(|k| k == after) {
            Some(pos) => Ok(self.hash_pair_from(&keys, pos + 1)),
            None => Err("invalid key to 'next'"),
        }
    }

    /// First snapshot key at or past `from` that is still present
    /// (keys removed mid-traversal get skipped)
    fn hash_pair_from(&self, keys: &[TableKey], from: usize) -> Option<(Value, Value)> {
        for key in &keys[from..] {
            if let Some(value) = self.hash.get(key) {
                return Some((key.to_value(), value.clone()));
            }
        }
        None
    }

    fn snapshot_keys(&mut self) -> Rc<Vec<TableKey>> {
        match &self.iter_keys {
            Some(keys) => keys.clone(),
            None => {
                let keys = Rc::new(self.hash.keys().cloned().collect::<Vec<_>>());
                self.iter_keys = Some(keys.clone());
                keys
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_part_growth() {
        let mut t = LuaTable::new();
        t.set(Value::Integer(1), Value::Integer(10)).unwrap();
        t.set(Value::Integer(2), Value::Integer(20)).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.get(&Value::Integer(2)), Value::Integer(20));
    }

    #[test]
    fn test_hash_migration_closes_gap() {
        let mut t = LuaTable::new();
        t.set(Value::Integer(2), Value::Integer(20)).unwrap();
        assert_eq!(t.len(), 0);
        t.set(Value::Integer(1), Value::Integer(10)).unwrap();
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_float_key_normalizes_to_integer() {
        let mut t = LuaTable::new();
        t.set(Value::Float(1.0), Value::str("x")).unwrap();
        assert_eq!(t.get(&Value::Integer(1)), Value::str("x"));
    }

    #[test]
    fn test_nil_and_nan_keys_rejected() {
        let mut t = LuaTable::new();
        assert!(t.set(Value::Nil, Value::Integer(1)).is_err());
        assert!(t.set(Value::Float(f64::NAN), Value::Integer(1)).is_err());
    }

    #[test]
    fn test_removing_last_shrinks_border() {
        let mut t = LuaTable::new();
        for i in 1..=3 {
            t.set(Value::Integer(i), Value::Integer(i * 10)).unwrap();
        }
        t.set(Value::Integer(3), Value::Nil).unwrap();
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_next_traverses_all_pairs() {
        let mut t = LuaTable::new();
        t.set(Value::Integer(1), Value::str("a")).unwrap();
        t.set(Value::str("k"), Value::str("b")).unwrap();

        let mut seen = 0;
        let mut key = Value::Nil;
        while let Some((k, _)) = t.next(&key).unwrap() {
            seen += 1;
            key = k;
        }
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_next_invalid_key() {
        let mut t = LuaTable::new();
        t.set(Value::Integer(1), Value::Integer(1)).unwrap();
        assert!(t.next(&Value::str("missing")).is_err());
    }

    #[test]
    fn test_insert_and_remove_shift() {
        let mut t = LuaTable::new();
        for i in 1..=3 {
            t.set(Value::Integer(i), Value::Integer(i)).unwrap();
        }
        t.insert(1, Value::Integer(0)).unwrap();
        assert_eq!(t.len(), 4);
        assert_eq!(t.get(&Value::Integer(1)), Value::Integer(0));
        assert_eq!(t.remove(1).unwrap(), Value::Integer(0));
        assert_eq!(t.len(), 3);
        assert_eq!(t.get(&Value::Integer(1)), Value::Integer(1));
    }
}
