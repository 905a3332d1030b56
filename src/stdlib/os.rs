//! The `os` table, reduced to clock arithmetic. Nothing here touches
//! the process environment, the filesystem, or other programs.

use std::time::{SystemTime, UNIX_EPOCH};

use super::{check_float, set_fn};
use crate::interp::Interp;
use crate::table::new_table;
use crate::value::Value;

pub fn install(interp: &mut Interp) {
    let os = new_table();

    set_fn(&os, "clock", |interp, _| {
        Ok(vec![Value::Float(interp.elapsed_secs())])
    });

    set_fn(&os, "time", |_, _| {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(vec![Value::Integer(now)])
    });

    set_fn(&os, "difftime", |_, args| {
        let t2 = check_float("difftime", &args, 1)?;
        let t1 = match args.get(1) {
            None | Some(Value::Nil) => 0.0,
            _ => check_float("difftime", &args, 2)?,
        };
        Ok(vec![Value::Float(t2 - t1)])
    });

    let _ = interp
        .globals
        .borrow_mut()
        .set(Value::str("os"), Value::Table(os));
}
