// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! The handful of native-protocol primitive encodings request/response bodies are built
//! from: `[short]`, `[int]`, `[string]`, `[long string]`, `[bytes]`, `[string map]`, etc.
//! Column-value encoding lives outside this crate (§1 scope).

use std::collections::HashMap;

pub fn write_short(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn write_int(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn write_long(out: &mut Vec<u8>, v: i64) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn write_string(out: &mut Vec<u8>, s: &str) {
    write_short(out, s.len() as u16);
    out.extend_from_slice(s.as_bytes());
}

pub fn write_long_string(out: &mut Vec<u8>, s: &str) {
    write_int(out, s.len() as i32);
    out.extend_from_slice(s.as_bytes());
}

/// `[bytes]`: a 4-byte length followed by that many bytes; length `-1` means null.
pub fn write_bytes(out: &mut Vec<u8>, b: Option<&[u8]>) {
    match b {
        Some(b) => {
            write_int(out, b.len() as i32);
            out.extend_from_slice(b);
        }
        None => write_int(out, -1),
    }
}

pub fn write_short_bytes(out: &mut Vec<u8>, b: &[u8]) {
    write_short(out, b.len() as u16);
    out.extend_from_slice(b);
}

pub fn write_string_list(out: &mut Vec<u8>, list: &[String]) {
    write_short(out, list.len() as u16);
    for s in list {
        write_string(out, s);
    }
}

pub fn write_string_map(out: &mut Vec<u8>, map: &HashMap<String, String>) {
    write_short(out, map.len() as u16);
    for (k, v) in map {
        write_string(out, k);
        write_string(out, v);
    }
}

pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    pub fn read_short(&mut self) -> anyhow::Result<u16> {
        anyhow::ensure!(self.buf.len() >= self.pos + 2, "truncated short");
        let v = u16::from_be_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    pub fn read_int(&mut self) -> anyhow::Result<i32> {
        anyhow::ensure!(self.buf.len() >= self.pos + 4, "truncated int");
        let v = i32::from_be_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }

    pub fn read_string(&mut self) -> anyhow::Result<String> {
        let len = self.read_short()? as usize;
        anyhow::ensure!(self.buf.len() >= self.pos + len, "truncated string");
        let s = String::from_utf8(self.buf[self.pos..self.pos + len].to_vec())?;
        self.pos += len;
        Ok(s)
    }

    pub fn read_long_string(&mut self) -> anyhow::Result<String> {
        let len = self.read_int()?;
        anyhow::ensure!(len >= 0, "negative long string length");
        let len = len as usize;
        anyhow::ensure!(self.buf.len() >= self.pos + len, "truncated long string");
        let s = String::from_utf8(self.buf[self.pos..self.pos + len].to_vec())?;
        self.pos += len;
        Ok(s)
    }

    pub fn read_bytes(&mut self) -> anyhow::Result<Option<Vec<u8>>> {
        let len = self.read_int()?;
        if len < 0 {
            return Ok(None);
        }
        let len = len as usize;
        anyhow::ensure!(self.buf.len() >= self.pos + len, "truncated bytes");
        let b = self.buf[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(Some(b))
    }

    pub fn read_short_bytes(&mut self) -> anyhow::Result<Vec<u8>> {
        let len = self.read_short()? as usize;
        anyhow::ensure!(self.buf.len() >= self.pos + len, "truncated short bytes");
        let b = self.buf[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(b)
    }

    pub fn read_string_list(&mut self) -> anyhow::Result<Vec<String>> {
        let n = self.read_short()?;
        (0..n).map(|_| self.read_string()).collect()
    }

    pub fn read_string_multimap(&mut self) -> anyhow::Result<HashMap<String, Vec<String>>> {
        let n = self.read_short()?;
        let mut map = HashMap::with_capacity(n as usize);
        for _ in 0..n {
            let key = self.read_string()?;
            let value = self.read_string_list()?;
            map.insert(key, value);
        }
        Ok(map)
    }
}
