//! A small class file assembler so tests can describe bytecode without compiled assets.

#![allow(dead_code)]

use std::collections::HashMap;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ENUM: u16 = 0x4000;

fn u16_be(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn u32_be(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Constant pool under construction; identical entries share one index.
#[derive(Default)]
pub struct Pool {
    entries: Vec<Vec<u8>>,
    next: u16,
    seen: HashMap<Vec<u8>, u16>,
}

impl Pool {
    fn add(&mut self, entry: Vec<u8>, slots: u16) -> u16 {
        if let Some(&index) = self.seen.get(&entry) {
            return index;
        }
        let index = self.next + 1;
        self.next += slots;
        self.seen.insert(entry.clone(), index);
        self.entries.push(entry);
        index
    }

    pub fn utf8(&mut self, text: &str) -> u16 {
        let mut entry = vec![1];
        u16_be(&mut entry, text.len() as u16);
        entry.extend_from_slice(text.as_bytes());
        self.add(entry, 1)
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        let mut entry = vec![3];
        entry.extend_from_slice(&value.to_be_bytes());
        self.add(entry, 1)
    }

    pub fn long(&mut self, value: i64) -> u16 {
        let mut entry = vec![5];
        entry.extend_from_slice(&value.to_be_bytes());
        self.add(entry, 2)
    }

    pub fn class(&mut self, internal_name: &str) -> u16 {
        let name = self.utf8(internal_name);
        let mut entry = vec![7];
        u16_be(&mut entry, name);
        self.add(entry, 1)
    }

    pub fn string(&mut self, text: &str) -> u16 {
        let value = self.utf8(text);
        let mut entry = vec![8];
        u16_be(&mut entry, value);
        self.add(entry, 1)
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let mut entry = vec![12];
        u16_be(&mut entry, name);
        u16_be(&mut entry, descriptor);
        self.add(entry, 1)
    }

    fn member(&mut self, tag: u8, class: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(class);
        let nat = self.name_and_type(name, descriptor);
        let mut entry = vec![tag];
        u16_be(&mut entry, class);
        u16_be(&mut entry, nat);
        self.add(entry, 1)
    }

    pub fn field_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member(9, class, name, descriptor)
    }

    pub fn method_ref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member(10, class, name, descriptor)
    }

    fn write(&self, out: &mut Vec<u8>) {
        u16_be(out, self.next + 1);
        for entry in &self.entries {
            out.extend_from_slice(entry);
        }
    }
}

/// One `LocalVariableTable` row.
pub struct Local {
    pub start: u16,
    pub length: u16,
    pub slot: u16,
    pub name: &'static str,
    pub descriptor: &'static str,
}

/// A `Code` attribute before its names are interned.
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub bytes: Vec<u8>,
    /// `(start, end, handler, catch class)`; `None` catches everything.
    pub exceptions: Vec<(u16, u16, u16, Option<&'static str>)>,
    /// `(start_pc, line)`.
    pub lines: Vec<(u16, u16)>,
    pub locals: Vec<Local>,
}

impl Code {
    pub fn new(max_stack: u16, max_locals: u16, bytes: Vec<u8>) -> Self {
        Code { max_stack, max_locals, bytes, exceptions: vec![], lines: vec![], locals: vec![] }
    }

    pub fn lines(mut self, lines: &[(u16, u16)]) -> Self {
        self.lines = lines.to_vec();
        self
    }

    pub fn local(mut self, slot: u16, name: &'static str, descriptor: &'static str) -> Self {
        let length = self.bytes.len() as u16;
        self.locals.push(Local { start: 0, length, slot, name, descriptor });
        self
    }

    pub fn local_range(mut self, slot: u16, name: &'static str, descriptor: &'static str, start: u16, length: u16) -> Self {
        self.locals.push(Local { start, length, slot, name, descriptor });
        self
    }

    pub fn handler(mut self, start: u16, end: u16, handler: u16, catch: Option<&'static str>) -> Self {
        self.exceptions.push((start, end, handler, catch));
        self
    }

    fn write(&self, pool: &mut Pool) -> Vec<u8> {
        let mut body = Vec::new();
        u16_be(&mut body, self.max_stack);
        u16_be(&mut body, self.max_locals);
        u32_be(&mut body, self.bytes.len() as u32);
        body.extend_from_slice(&self.bytes);
        u16_be(&mut body, self.exceptions.len() as u16);
        for &(start, end, handler, catch) in &self.exceptions {
            u16_be(&mut body, start);
            u16_be(&mut body, end);
            u16_be(&mut body, handler);
            let catch = catch.map_or(0, |name| pool.class(name));
            u16_be(&mut body, catch);
        }

        let mut attributes = Vec::new();
        if !self.lines.is_empty() {
            let mut table = Vec::new();
            u16_be(&mut table, self.lines.len() as u16);
            for &(pc, line) in &self.lines {
                u16_be(&mut table, pc);
                u16_be(&mut table, line);
            }
            attributes.push(attribute(pool, "LineNumberTable", table));
        }
        if !self.locals.is_empty() {
            let mut table = Vec::new();
            u16_be(&mut table, self.locals.len() as u16);
            for local in &self.locals {
                u16_be(&mut table, local.start);
                u16_be(&mut table, local.length);
                let name = pool.utf8(local.name);
                let descriptor = pool.utf8(local.descriptor);
                u16_be(&mut table, name);
                u16_be(&mut table, descriptor);
                u16_be(&mut table, local.slot);
            }
            attributes.push(attribute(pool, "LocalVariableTable", table));
        }
        u16_be(&mut body, attributes.len() as u16);
        for a in attributes {
            body.extend_from_slice(&a);
        }
        body
    }
}

fn attribute(pool: &mut Pool, name: &str, info: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::new();
    let name = pool.utf8(name);
    u16_be(&mut out, name);
    u32_be(&mut out, info.len() as u32);
    out.extend_from_slice(&info);
    out
}

/// A class file under construction. Members are serialized as they are added.
pub struct ClassBuilder {
    pub pool: Pool,
    pub major: u16,
    access: u16,
    pub this_class: u16,
    super_class: u16,
    fields: Vec<Vec<u8>>,
    methods: Vec<Vec<u8>>,
    inner_classes: Vec<[u16; 4]>,
}

impl ClassBuilder {
    pub fn new(name: &str, super_name: &str) -> Self {
        let mut pool = Pool::default();
        let this_class = pool.class(name);
        let super_class = pool.class(super_name);
        ClassBuilder {
            pool,
            major: 52,
            access: ACC_PUBLIC | ACC_SUPER,
            this_class,
            super_class,
            fields: vec![],
            methods: vec![],
            inner_classes: vec![],
        }
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn field(&mut self, access: u16, name: &str, descriptor: &str) {
        let mut out = Vec::new();
        u16_be(&mut out, access);
        let name = self.pool.utf8(name);
        let descriptor = self.pool.utf8(descriptor);
        u16_be(&mut out, name);
        u16_be(&mut out, descriptor);
        u16_be(&mut out, 0);
        self.fields.push(out);
    }

    pub fn method(&mut self, access: u16, name: &str, descriptor: &str, code: Option<Code>) {
        let mut out = Vec::new();
        u16_be(&mut out, access);
        let name = self.pool.utf8(name);
        let descriptor = self.pool.utf8(descriptor);
        u16_be(&mut out, name);
        u16_be(&mut out, descriptor);
        match code {
            Some(code) => {
                u16_be(&mut out, 1);
                let body = code.write(&mut self.pool);
                let attr = attribute(&mut self.pool, "Code", body);
                out.extend_from_slice(&attr);
            }
            None => u16_be(&mut out, 0),
        }
        self.methods.push(out);
    }

    /// Default constructor calling `super_name`'s no-argument constructor.
    pub fn default_constructor(&mut self, super_name: &str) {
        let init = self.pool.method_ref(super_name, "<init>", "()V");
        let [hi, lo] = init.to_be_bytes();
        self.method(ACC_PUBLIC, "<init>", "()V", Some(Code::new(1, 1, vec![0x2a, 0xb7, hi, lo, 0xb1])));
    }

    /// An `InnerClasses` row for `inner`, declared in `outer` when it is a member class.
    pub fn inner_class(&mut self, inner: &str, outer: Option<&str>, simple_name: Option<&str>, access: u16) {
        let inner = self.pool.class(inner);
        let outer = outer.map_or(0, |o| self.pool.class(o));
        let simple = simple_name.map_or(0, |n| self.pool.utf8(n));
        self.inner_classes.push([inner, outer, simple, access]);
    }

    pub fn build(mut self) -> Vec<u8> {
        let mut attributes = Vec::new();
        if !self.inner_classes.is_empty() {
            let mut table = Vec::new();
            u16_be(&mut table, self.inner_classes.len() as u16);
            for row in &self.inner_classes {
                for value in row {
                    u16_be(&mut table, *value);
                }
            }
            attributes.push(attribute(&mut self.pool, "InnerClasses", table));
        }

        let mut out = Vec::new();
        u32_be(&mut out, 0xCAFE_BABE);
        u16_be(&mut out, 0);
        u16_be(&mut out, self.major);
        self.pool.write(&mut out);
        u16_be(&mut out, self.access);
        u16_be(&mut out, self.this_class);
        u16_be(&mut out, self.super_class);
        u16_be(&mut out, 0);
        u16_be(&mut out, self.fields.len() as u16);
        for f in &self.fields {
            out.extend_from_slice(f);
        }
        u16_be(&mut out, self.methods.len() as u16);
        for m in &self.methods {
            out.extend_from_slice(m);
        }
        u16_be(&mut out, attributes.len() as u16);
        for a in &attributes {
            out.extend_from_slice(a);
        }
        out
    }
}

/// Big-endian bytes of a constant pool index, for splicing into bytecode.
pub fn idx(index: u16) -> [u8; 2] {
    index.to_be_bytes()
}
