//! Parses a request's argument vector into a command and applies it to a
//! [`Keyspace`], producing a [`Reply`].
//!
//! Command names are matched case-insensitively, mirroring the original
//! `strcasecmp`-based dispatch table this store's wire protocol was
//! modeled on.

use crate::entry::Value;
use crate::keyspace::Keyspace;
use crate::protocol::{self, ErrorCode, Reply};

/// Dispatches one already-parsed request. Never panics on attacker-
/// controlled input: malformed arguments produce an `ERR` reply, not a
/// crash.
pub fn dispatch(keyspace: &mut Keyspace, args: &[Vec<u8>]) -> Reply {
    let Some(command) = args.first() else {
        return Reply::err(ErrorCode::ArgError, "empty command");
    };
    let command = command.to_ascii_uppercase();

    match command.as_slice() {
        b"GET" => cmd_get(keyspace, args),
        b"SET" => cmd_set(keyspace, args),
        b"DEL" => cmd_del(keyspace, args),
        b"KEYS" => cmd_keys(keyspace, args),
        b"ZADD" => cmd_zadd(keyspace, args),
        b"ZREM" => cmd_zrem(keyspace, args),
        b"ZSCORE" => cmd_zscore(keyspace, args),
        b"ZQUERY" => cmd_zquery(keyspace, args),
        _ => Reply::err(ErrorCode::Unknown, "unknown command"),
    }
}

fn arity_error() -> Reply {
    Reply::err(ErrorCode::ArgError, "wrong number of arguments")
}

fn parse_f64(bytes: &[u8], what: &str) -> Result<f64, Reply> {
    let text = std::str::from_utf8(bytes).map_err(|_| Reply::err(ErrorCode::ArgError, format!("{what} is not valid utf-8")))?;
    let value: f64 = text
        .parse()
        .map_err(|_| Reply::err(ErrorCode::ArgError, format!("{what} is not a number")))?;
    if value.is_nan() {
        return Err(Reply::err(ErrorCode::ArgError, format!("{what} must not be NaN")));
    }
    Ok(value)
}

fn parse_i64(bytes: &[u8], what: &str) -> Result<i64, Reply> {
    let text = std::str::from_utf8(bytes).map_err(|_| Reply::err(ErrorCode::ArgError, format!("{what} is not valid utf-8")))?;
    text.parse().map_err(|_| Reply::err(ErrorCode::ArgError, format!("{what} is not an integer")))
}

fn cmd_get(keyspace: &Keyspace, args: &[Vec<u8>]) -> Reply {
    if args.len() != 2 {
        return arity_error();
    }
    match keyspace.get(&args[1]) {
        None => Reply::Nil,
        Some(Value::Str(s)) => Reply::Str(s.clone()),
        Some(Value::SortedSet(_)) => Reply::err(ErrorCode::TypeMismatch, "key holds a zset, not a string"),
    }
}

fn cmd_set(keyspace: &mut Keyspace, args: &[Vec<u8>]) -> Reply {
    if args.len() != 3 {
        return arity_error();
    }
    keyspace.set_str(args[1].clone(), args[2].clone());
    Reply::Nil
}

fn cmd_del(keyspace: &mut Keyspace, args: &[Vec<u8>]) -> Reply {
    if args.len() != 2 {
        return arity_error();
    }
    Reply::Int(if keyspace.del(&args[1]) { 1 } else { 0 })
}

fn cmd_keys(keyspace: &Keyspace, args: &[Vec<u8>]) -> Reply {
    if args.len() != 1 {
        return arity_error();
    }
    Reply::Arr(keyspace.keys().into_iter().map(Reply::Str).collect())
}

fn cmd_zadd(keyspace: &mut Keyspace, args: &[Vec<u8>]) -> Reply {
    if args.len() != 4 {
        return arity_error();
    }
    let score = match parse_f64(&args[2], "score") {
        Ok(score) => score,
        Err(reply) => return reply,
    };
    match keyspace.zset_mut_or_insert(&args[1]) {
        Ok(set) => Reply::Int(if set.insert(args[3].clone(), score) { 1 } else { 0 }),
        Err(_) => Reply::err(ErrorCode::TypeMismatch, "key holds a string, not a zset"),
    }
}

fn cmd_zrem(keyspace: &mut Keyspace, args: &[Vec<u8>]) -> Reply {
    if args.len() != 3 {
        return arity_error();
    }
    match keyspace.zset(&args[1]) {
        Ok(None) => Reply::Int(0),
        Ok(Some(_)) => {
            let set = keyspace.zset_mut_or_insert(&args[1]).expect("just confirmed zset");
            Reply::Int(if set.remove(&args[2]).is_some() { 1 } else { 0 })
        }
        Err(_) => Reply::err(ErrorCode::TypeMismatch, "key holds a string, not a zset"),
    }
}

fn cmd_zscore(keyspace: &Keyspace, args: &[Vec<u8>]) -> Reply {
    if args.len() != 3 {
        return arity_error();
    }
    match keyspace.zset(&args[1]) {
        Ok(None) => Reply::Nil,
        Ok(Some(set)) => match set.score(&args[2]) {
            Some(score) => Reply::Dbl(score),
            None => Reply::Nil,
        },
        Err(_) => Reply::err(ErrorCode::TypeMismatch, "key holds a string, not a zset"),
    }
}

fn cmd_zquery(keyspace: &Keyspace, args: &[Vec<u8>]) -> Reply {
    if args.len() != 6 {
        return arity_error();
    }
    let score = match parse_f64(&args[2], "score") {
        Ok(score) => score,
        Err(reply) => return reply,
    };
    let offset = match parse_i64(&args[4], "offset") {
        Ok(offset) => offset,
        Err(reply) => return reply,
    };
    let limit = match parse_i64(&args[5], "limit") {
        Ok(limit) if limit >= 0 => limit as usize,
        Ok(_) => return Reply::err(ErrorCode::ArgError, "limit must not be negative"),
        Err(reply) => return reply,
    };
    match keyspace.zset(&args[1]) {
        Ok(None) => Reply::Arr(Vec::new()),
        Ok(Some(set)) => {
            // Streamed directly into the wire body rather than collected
            // into a `Vec<Reply>` first: the element count isn't known
            // until the walk runs out of members or hits `limit`, so the
            // count is patched in after the fact, same as the original
            // server's `do_zquery`.
            let mut body = Vec::new();
            let pos = protocol::begin_array(&mut body);
            let mut n: u32 = 0;
            for member in set.query_iter(score, &args[3], offset).take(limit) {
                protocol::push_str(&mut body, &member.name);
                protocol::push_dbl(&mut body, member.score);
                n += 2;
            }
            protocol::end_array(&mut body, pos, n);
            Reply::Raw(body)
        }
        Err(_) => Reply::err(ErrorCode::TypeMismatch, "key holds a string, not a zset"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(strs: &[&str]) -> Vec<Vec<u8>> {
        strs.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut ks = Keyspace::new();
        assert_eq!(dispatch(&mut ks, &args(&["SET", "k", "v"])), Reply::Nil);
        assert_eq!(dispatch(&mut ks, &args(&["GET", "k"])), Reply::Str(b"v".to_vec()));
    }

    #[test]
    fn get_missing_key_is_nil() {
        let mut ks = Keyspace::new();
        assert_eq!(dispatch(&mut ks, &args(&["GET", "missing"])), Reply::Nil);
    }

    #[test]
    fn commands_are_case_insensitive() {
        let mut ks = Keyspace::new();
        dispatch(&mut ks, &args(&["set", "k", "v"]));
        assert_eq!(dispatch(&mut ks, &args(&["Get", "k"])), Reply::Str(b"v".to_vec()));
    }

    #[test]
    fn del_reports_whether_a_key_existed() {
        let mut ks = Keyspace::new();
        dispatch(&mut ks, &args(&["SET", "k", "v"]));
        assert_eq!(dispatch(&mut ks, &args(&["DEL", "k"])), Reply::Int(1));
        assert_eq!(dispatch(&mut ks, &args(&["DEL", "k"])), Reply::Int(0));
    }

    #[test]
    fn zadd_rejects_nan_scores() {
        let mut ks = Keyspace::new();
        let reply = dispatch(&mut ks, &args(&["ZADD", "z", "nan", "a"]));
        assert!(matches!(reply, Reply::Err(ErrorCode::ArgError, _)));
    }

    #[test]
    fn zadd_on_a_string_key_is_a_type_mismatch() {
        let mut ks = Keyspace::new();
        dispatch(&mut ks, &args(&["SET", "k", "v"]));
        let reply = dispatch(&mut ks, &args(&["ZADD", "k", "1", "a"]));
        assert!(matches!(reply, Reply::Err(ErrorCode::TypeMismatch, _)));
    }

    #[test]
    fn zquery_walks_members_in_order() {
        let mut ks = Keyspace::new();
        for (name, score) in [("a", "1"), ("b", "2"), ("c", "3")] {
            dispatch(&mut ks, &args(&["ZADD", "z", score, name]));
        }
        let reply = dispatch(&mut ks, &args(&["ZQUERY", "z", "1", "a", "0", "10"]));
        match reply {
            Reply::Raw(body) => {
                assert_eq!(body[0], 5 /* ARR tag */);
                let count = u32::from_le_bytes(body[1..5].try_into().unwrap());
                assert_eq!(count, 6);
            }
            other => panic!("expected a streamed array body, got {other:?}"),
        }
    }

    #[test]
    fn unknown_command_is_reported() {
        let mut ks = Keyspace::new();
        let reply = dispatch(&mut ks, &args(&["NOPE"]));
        assert!(matches!(reply, Reply::Err(ErrorCode::Unknown, _)));
    }
}
