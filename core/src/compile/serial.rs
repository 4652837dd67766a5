//! Binary container format for compiled programs.
//!
//! Layout: a four-byte magic and format version, then length-prefixed
//! little-endian sections: filename, name table, constant table, global
//! table, function table, toplevel function. Writers emit tables in a
//! stable order; readers validate every index before the program is
//! allowed anywhere near the VM.

use std::io::{Read, Write};
use std::sync::Arc;

use num_bigint::{BigInt, Sign};

use crate::error::Error;
use crate::resolve::{ParamInfo, ParamKind};
use crate::token::Position;
use crate::val::int::Int;
use crate::val::{Str, Value};

use super::{Funcode, Instr, Program, ProgramData};

pub const MAGIC: [u8; 4] = *b"BSLT";
pub const FORMAT_VERSION: u16 = 1;

/// Decode a program from a reader.
pub fn read_program(r: &mut dyn Read) -> Result<Program, Error> {
    let mut buf = Vec::new();
    r.read_to_end(&mut buf)?;
    decode_program(&buf)
}

/// Encode a program to a writer.
pub fn write_program(p: &Program, w: &mut dyn Write) -> Result<(), Error> {
    let bytes = encode_program(p)?;
    w.write_all(&bytes)?;
    Ok(())
}

pub fn encode_program(p: &Program) -> Result<Vec<u8>, Error> {
    let d = &p.data;
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    write_u16(&mut out, FORMAT_VERSION);
    write_u16(&mut out, 0); // reserved

    write_str(&mut out, &d.filename);

    write_u32(&mut out, d.names.len() as u32);
    for name in &d.names {
        write_str(&mut out, name);
    }

    write_u32(&mut out, d.constants.len() as u32);
    for c in &d.constants {
        encode_constant(&mut out, c)?;
    }

    write_u32(&mut out, d.globals.len() as u32);
    for g in &d.globals {
        write_str(&mut out, g);
    }

    write_u32(&mut out, d.functions.len() as u32);
    for f in &d.functions {
        encode_funcode(&mut out, f);
    }

    encode_funcode(&mut out, &d.toplevel);
    Ok(out)
}

pub fn decode_program(bytes: &[u8]) -> Result<Program, Error> {
    if bytes.len() < 8 || bytes[..4] != MAGIC {
        return Err(Error::Decode("not a compiled module".to_string()));
    }
    let mut cur = 4usize;
    let version = read_u16(bytes, &mut cur)?;
    let _reserved = read_u16(bytes, &mut cur)?;
    if version != FORMAT_VERSION {
        return Err(Error::Decode(format!(
            "not a compiled module: unsupported version {} (want {})",
            version, FORMAT_VERSION
        )));
    }

    let filename = Arc::<str>::from(read_string(bytes, &mut cur)?);

    let nnames = read_u32(bytes, &mut cur)? as usize;
    let mut names = Vec::with_capacity(nnames.min(1 << 16));
    for _ in 0..nnames {
        names.push(Arc::<str>::from(read_string(bytes, &mut cur)?));
    }

    let nconsts = read_u32(bytes, &mut cur)? as usize;
    let mut constants = Vec::with_capacity(nconsts.min(1 << 16));
    for _ in 0..nconsts {
        constants.push(decode_constant(bytes, &mut cur)?);
    }

    let nglobals = read_u32(bytes, &mut cur)? as usize;
    let mut globals = Vec::with_capacity(nglobals.min(1 << 16));
    for _ in 0..nglobals {
        globals.push(Arc::<str>::from(read_string(bytes, &mut cur)?));
    }

    let nfuncs = read_u32(bytes, &mut cur)? as usize;
    let mut functions = Vec::with_capacity(nfuncs.min(1 << 16));
    for _ in 0..nfuncs {
        functions.push(Arc::new(decode_funcode(bytes, &mut cur)?));
    }

    let toplevel = Arc::new(decode_funcode(bytes, &mut cur)?);

    if cur != bytes.len() {
        return Err(Error::Decode("trailing garbage after compiled module".to_string()));
    }

    let data = ProgramData {
        filename,
        names,
        constants,
        functions,
        globals,
        toplevel,
    };
    for f in data.functions.iter().chain(std::iter::once(&data.toplevel)) {
        validate_funcode(f, &data)?;
    }
    Ok(Program {
        data: Arc::new(data),
    })
}

// ---- constants ----

const CONST_NONE: u8 = 0;
const CONST_TRUE: u8 = 1;
const CONST_FALSE: u8 = 2;
const CONST_INT: u8 = 3;
const CONST_BIGINT: u8 = 4;
const CONST_FLOAT: u8 = 5;
const CONST_STRING: u8 = 6;
const CONST_BYTES: u8 = 7;

fn encode_constant(out: &mut Vec<u8>, c: &Value) -> Result<(), Error> {
    match c {
        Value::None => out.push(CONST_NONE),
        Value::Bool(true) => out.push(CONST_TRUE),
        Value::Bool(false) => out.push(CONST_FALSE),
        Value::Int(Int::Small(v)) => {
            out.push(CONST_INT);
            write_varint(out, *v);
        }
        Value::Int(Int::Big(b)) => {
            out.push(CONST_BIGINT);
            let (sign, mag) = b.to_bytes_le();
            out.push(if sign == Sign::Minus { 1 } else { 0 });
            write_u32(out, mag.len() as u32);
            out.extend_from_slice(&mag);
        }
        Value::Float(f) => {
            out.push(CONST_FLOAT);
            out.extend_from_slice(&f.to_bits().to_le_bytes());
        }
        Value::Str(s) => {
            out.push(CONST_STRING);
            write_u32(out, s.len() as u32);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            out.push(CONST_BYTES);
            write_u32(out, b.len() as u32);
            out.extend_from_slice(b.as_bytes());
        }
        other => {
            return Err(Error::Decode(format!(
                "cannot encode {} constant",
                other.type_name()
            )));
        }
    }
    Ok(())
}

fn decode_constant(bytes: &[u8], cur: &mut usize) -> Result<Value, Error> {
    let tag = read_u8(bytes, cur)?;
    Ok(match tag {
        CONST_NONE => Value::None,
        CONST_TRUE => Value::Bool(true),
        CONST_FALSE => Value::Bool(false),
        CONST_INT => Value::Int(Int::Small(read_varint(bytes, cur)?)),
        CONST_BIGINT => {
            let neg = read_u8(bytes, cur)? != 0;
            let mag = read_blob(bytes, cur)?;
            let sign = if neg { Sign::Minus } else { Sign::Plus };
            Value::Int(Int::from_big(BigInt::from_bytes_le(sign, mag)))
        }
        CONST_FLOAT => {
            let bits = read_u64(bytes, cur)?;
            Value::Float(f64::from_bits(bits))
        }
        CONST_STRING => Value::Str(Str::from_bytes(read_blob(bytes, cur)?.to_vec())),
        CONST_BYTES => Value::bytes(read_blob(bytes, cur)?.to_vec()),
        other => {
            return Err(Error::Decode(format!("unknown constant tag {}", other)));
        }
    })
}

// ---- functions ----

fn encode_funcode(out: &mut Vec<u8>, f: &Funcode) {
    write_str(out, &f.name);
    write_str(out, &f.doc);
    write_pos(out, f.pos);

    write_u32(out, f.params.len() as u32);
    for p in &f.params {
        write_str(out, &p.name);
        write_pos(out, p.pos);
        out.push(match p.kind {
            ParamKind::Normal => 0,
            ParamKind::KwOnly => 1,
            ParamKind::VarArgs => 2,
            ParamKind::KwArgs => 3,
        });
        out.push(u8::from(p.has_default));
    }
    write_u32(out, f.num_kwonly);
    out.push(u8::from(f.has_varargs));
    out.push(u8::from(f.has_kwargs));

    write_u32(out, f.locals.len() as u32);
    for (name, pos) in &f.locals {
        write_str(out, name);
        write_pos(out, *pos);
    }

    write_u32(out, f.cells.len() as u32);
    for c in &f.cells {
        write_u32(out, *c);
    }

    write_u32(out, f.freevars.len() as u32);
    for fv in &f.freevars {
        write_str(out, fv);
    }

    // Code blob, length-prefixed so unknown sections stay skippable.
    let mut code = Vec::new();
    write_u32(&mut code, f.code.len() as u32);
    for instr in &f.code {
        encode_instr(&mut code, *instr);
    }
    write_u32(out, code.len() as u32);
    out.extend_from_slice(&code);

    write_u32(out, f.pclinetab.len() as u32);
    for &(pc, line, col) in &f.pclinetab {
        write_u32(out, pc);
        write_u32(out, line);
        write_u32(out, col);
    }
}

fn decode_funcode(bytes: &[u8], cur: &mut usize) -> Result<Funcode, Error> {
    let name = Arc::<str>::from(read_string(bytes, cur)?);
    let doc = read_string(bytes, cur)?;
    let pos = read_pos(bytes, cur)?;

    let nparams = read_u32(bytes, cur)? as usize;
    let mut params = Vec::with_capacity(nparams.min(1 << 12));
    for _ in 0..nparams {
        let pname = Arc::<str>::from(read_string(bytes, cur)?);
        let ppos = read_pos(bytes, cur)?;
        let kind = match read_u8(bytes, cur)? {
            0 => ParamKind::Normal,
            1 => ParamKind::KwOnly,
            2 => ParamKind::VarArgs,
            3 => ParamKind::KwArgs,
            other => {
                return Err(Error::Decode(format!("unknown parameter kind {}", other)));
            }
        };
        let has_default = read_u8(bytes, cur)? != 0;
        params.push(ParamInfo {
            name: pname,
            pos: ppos,
            kind,
            has_default,
        });
    }
    let num_kwonly = read_u32(bytes, cur)?;
    let has_varargs = read_u8(bytes, cur)? != 0;
    let has_kwargs = read_u8(bytes, cur)? != 0;

    let nlocals = read_u32(bytes, cur)? as usize;
    let mut locals = Vec::with_capacity(nlocals.min(1 << 16));
    for _ in 0..nlocals {
        let lname = Arc::<str>::from(read_string(bytes, cur)?);
        let lpos = read_pos(bytes, cur)?;
        locals.push((lname, lpos));
    }

    let ncells = read_u32(bytes, cur)? as usize;
    let mut cells = Vec::with_capacity(ncells.min(1 << 16));
    for _ in 0..ncells {
        let c = read_u32(bytes, cur)?;
        if c as usize >= locals.len() {
            return Err(Error::Decode(format!("cell index {} out of range", c)));
        }
        cells.push(c);
    }

    let nfree = read_u32(bytes, cur)? as usize;
    let mut freevars = Vec::with_capacity(nfree.min(1 << 16));
    for _ in 0..nfree {
        freevars.push(Arc::<str>::from(read_string(bytes, cur)?));
    }

    let code_len = read_u32(bytes, cur)? as usize;
    if *cur + code_len > bytes.len() {
        return Err(Error::Decode("code section overruns payload".to_string()));
    }
    let code_end = *cur + code_len;
    let ninstr = read_u32(bytes, cur)? as usize;
    let mut code = Vec::with_capacity(ninstr.min(1 << 20));
    for _ in 0..ninstr {
        code.push(decode_instr(bytes, cur)?);
    }
    if *cur != code_end {
        return Err(Error::Decode("code section length mismatch".to_string()));
    }

    let npcline = read_u32(bytes, cur)? as usize;
    let mut pclinetab = Vec::with_capacity(npcline.min(1 << 20));
    let mut last_pc = 0u32;
    for i in 0..npcline {
        let pc = read_u32(bytes, cur)?;
        let line = read_u32(bytes, cur)?;
        let col = read_u32(bytes, cur)?;
        if i > 0 && pc < last_pc {
            return Err(Error::Decode("position table is not sorted".to_string()));
        }
        last_pc = pc;
        pclinetab.push((pc, line, col));
    }

    Ok(Funcode {
        name,
        doc,
        pos,
        params,
        num_kwonly,
        has_varargs,
        has_kwargs,
        locals,
        cells,
        freevars,
        code,
        pclinetab,
    })
}

/// Reject any instruction whose operand indexes outside its table.
fn validate_funcode(f: &Funcode, data: &ProgramData) -> Result<(), Error> {
    if f.params.len() > f.locals.len() {
        return Err(Error::Decode(format!(
            "function {}: {} parameters but only {} locals",
            f.name,
            f.params.len(),
            f.locals.len()
        )));
    }
    let sinks = usize::from(f.has_varargs) + usize::from(f.has_kwargs);
    if f.num_kwonly as usize + sinks > f.params.len() {
        return Err(Error::Decode(format!(
            "function {}: inconsistent parameter shape",
            f.name
        )));
    }
    let code_len = f.code.len() as u32;
    for (pc, instr) in f.code.iter().enumerate() {
        let bad = |what: &str, idx: u32| {
            Err(Error::Decode(format!(
                "function {}: pc {}: {} index {} out of range",
                f.name, pc, what, idx
            )))
        };
        match *instr {
            Instr::Constant(i) if i as usize >= data.constants.len() => {
                return bad("constant", i);
            }
            Instr::Global(i) | Instr::SetGlobal(i) if i as usize >= data.globals.len() => {
                return bad("global", i);
            }
            Instr::Predeclared(i) | Instr::Universal(i) | Instr::Attr(i) | Instr::SetField(i)
                if i as usize >= data.names.len() =>
            {
                return bad("name", i);
            }
            Instr::Local(i) | Instr::SetLocal(i) | Instr::LocalCell(i) | Instr::SetLocalCell(i)
                if i as usize >= f.locals.len() =>
            {
                return bad("local", i);
            }
            Instr::Free(i) | Instr::FreeCell(i) if i as usize >= f.freevars.len() => {
                return bad("freevar", i);
            }
            Instr::MakeFunc(i) if i as usize >= data.functions.len() => {
                return bad("function", i);
            }
            Instr::Jmp(t) | Instr::CJmp(t) | Instr::IterJmp(t) if t > code_len => {
                return bad("jump target", t);
            }
            _ => {}
        }
    }
    Ok(())
}

// ---- instructions ----

fn instr_tag(instr: Instr) -> u8 {
    match instr {
        Instr::Nop => 0,
        Instr::Dup => 1,
        Instr::Dup2 => 2,
        Instr::Pop => 3,
        Instr::Exch => 4,
        Instr::NoneVal => 5,
        Instr::TrueVal => 6,
        Instr::FalseVal => 7,
        Instr::Mandatory => 8,
        Instr::Not => 9,
        Instr::Neg => 10,
        Instr::Pos => 11,
        Instr::Invert => 12,
        Instr::Eq => 13,
        Instr::Ne => 14,
        Instr::Lt => 15,
        Instr::Le => 16,
        Instr::Gt => 17,
        Instr::Ge => 18,
        Instr::Add => 19,
        Instr::Sub => 20,
        Instr::Mul => 21,
        Instr::Div => 22,
        Instr::FloorDiv => 23,
        Instr::Mod => 24,
        Instr::Pipe => 25,
        Instr::Amp => 26,
        Instr::Caret => 27,
        Instr::Shl => 28,
        Instr::Shr => 29,
        Instr::InOp => 30,
        Instr::InplaceAdd => 31,
        Instr::Index => 32,
        Instr::SetIndex => 33,
        Instr::Slice => 34,
        Instr::Append => 35,
        Instr::SetDict => 36,
        Instr::SetDictUniq => 37,
        Instr::MakeDict => 38,
        Instr::IterPush => 39,
        Instr::IterPop => 40,
        Instr::Return => 41,
        Instr::MakeTuple(_) => 64,
        Instr::MakeList(_) => 65,
        Instr::MakeSet(_) => 66,
        Instr::Unpack(_) => 67,
        Instr::IterJmp(_) => 68,
        Instr::Jmp(_) => 69,
        Instr::CJmp(_) => 70,
        Instr::Constant(_) => 71,
        Instr::Local(_) => 72,
        Instr::SetLocal(_) => 73,
        Instr::LocalCell(_) => 74,
        Instr::SetLocalCell(_) => 75,
        Instr::Free(_) => 76,
        Instr::FreeCell(_) => 77,
        Instr::Global(_) => 78,
        Instr::SetGlobal(_) => 79,
        Instr::Predeclared(_) => 80,
        Instr::Universal(_) => 81,
        Instr::Attr(_) => 82,
        Instr::SetField(_) => 83,
        Instr::MakeFunc(_) => 84,
        Instr::Call(_) => 85,
        Instr::CallVar(_) => 86,
        Instr::CallKw(_) => 87,
        Instr::CallVarKw(_) => 88,
        Instr::Load(_) => 89,
    }
}

fn encode_instr(out: &mut Vec<u8>, instr: Instr) {
    out.push(instr_tag(instr));
    if let Some(arg) = instr.arg() {
        write_u32(out, arg);
    }
}

fn decode_instr(bytes: &[u8], cur: &mut usize) -> Result<Instr, Error> {
    let tag = read_u8(bytes, cur)?;
    let simple = match tag {
        0 => Some(Instr::Nop),
        1 => Some(Instr::Dup),
        2 => Some(Instr::Dup2),
        3 => Some(Instr::Pop),
        4 => Some(Instr::Exch),
        5 => Some(Instr::NoneVal),
        6 => Some(Instr::TrueVal),
        7 => Some(Instr::FalseVal),
        8 => Some(Instr::Mandatory),
        9 => Some(Instr::Not),
        10 => Some(Instr::Neg),
        11 => Some(Instr::Pos),
        12 => Some(Instr::Invert),
        13 => Some(Instr::Eq),
        14 => Some(Instr::Ne),
        15 => Some(Instr::Lt),
        16 => Some(Instr::Le),
        17 => Some(Instr::Gt),
        18 => Some(Instr::Ge),
        19 => Some(Instr::Add),
        20 => Some(Instr::Sub),
        21 => Some(Instr::Mul),
        22 => Some(Instr::Div),
        23 => Some(Instr::FloorDiv),
        24 => Some(Instr::Mod),
        25 => Some(Instr::Pipe),
        26 => Some(Instr::Amp),
        27 => Some(Instr::Caret),
        28 => Some(Instr::Shl),
        29 => Some(Instr::Shr),
        30 => Some(Instr::InOp),
        31 => Some(Instr::InplaceAdd),
        32 => Some(Instr::Index),
        33 => Some(Instr::SetIndex),
        34 => Some(Instr::Slice),
        35 => Some(Instr::Append),
        36 => Some(Instr::SetDict),
        37 => Some(Instr::SetDictUniq),
        38 => Some(Instr::MakeDict),
        39 => Some(Instr::IterPush),
        40 => Some(Instr::IterPop),
        41 => Some(Instr::Return),
        _ => None,
    };
    if let Some(instr) = simple {
        return Ok(instr);
    }
    let arg = read_u32(bytes, cur)?;
    Ok(match tag {
        64 => Instr::MakeTuple(arg),
        65 => Instr::MakeList(arg),
        66 => Instr::MakeSet(arg),
        67 => Instr::Unpack(arg),
        68 => Instr::IterJmp(arg),
        69 => Instr::Jmp(arg),
        70 => Instr::CJmp(arg),
        71 => Instr::Constant(arg),
        72 => Instr::Local(arg),
        73 => Instr::SetLocal(arg),
        74 => Instr::LocalCell(arg),
        75 => Instr::SetLocalCell(arg),
        76 => Instr::Free(arg),
        77 => Instr::FreeCell(arg),
        78 => Instr::Global(arg),
        79 => Instr::SetGlobal(arg),
        80 => Instr::Predeclared(arg),
        81 => Instr::Universal(arg),
        82 => Instr::Attr(arg),
        83 => Instr::SetField(arg),
        84 => Instr::MakeFunc(arg),
        85 => Instr::Call(arg),
        86 => Instr::CallVar(arg),
        87 => Instr::CallKw(arg),
        88 => Instr::CallVarKw(arg),
        89 => Instr::Load(arg),
        other => {
            return Err(Error::Decode(format!("unknown opcode tag {}", other)));
        }
    })
}

// ---- primitive encoding ----

fn write_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_str(out: &mut Vec<u8>, s: &str) {
    write_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

fn write_pos(out: &mut Vec<u8>, pos: Position) {
    write_u32(out, pos.line);
    write_u32(out, pos.col);
}

/// Signed LEB128, for constants that fit in 64 bits.
fn write_varint(out: &mut Vec<u8>, mut v: i64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        let done = (v == 0 && byte & 0x40 == 0) || (v == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn read_varint(bytes: &[u8], cur: &mut usize) -> Result<i64, Error> {
    let mut result: i64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = read_u8(bytes, cur)?;
        if shift >= 64 {
            return Err(Error::Decode("varint too long".to_string()));
        }
        result |= i64::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if shift < 64 && byte & 0x40 != 0 {
                result |= -1i64 << shift;
            }
            return Ok(result);
        }
    }
}

fn read_u8(bytes: &[u8], cur: &mut usize) -> Result<u8, Error> {
    let Some(&b) = bytes.get(*cur) else {
        return Err(Error::Decode("unexpected end of compiled module".to_string()));
    };
    *cur += 1;
    Ok(b)
}

fn read_u16(bytes: &[u8], cur: &mut usize) -> Result<u16, Error> {
    if *cur + 2 > bytes.len() {
        return Err(Error::Decode("unexpected end of compiled module".to_string()));
    }
    let mut buf = [0u8; 2];
    buf.copy_from_slice(&bytes[*cur..*cur + 2]);
    *cur += 2;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(bytes: &[u8], cur: &mut usize) -> Result<u32, Error> {
    if *cur + 4 > bytes.len() {
        return Err(Error::Decode("unexpected end of compiled module".to_string()));
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[*cur..*cur + 4]);
    *cur += 4;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(bytes: &[u8], cur: &mut usize) -> Result<u64, Error> {
    if *cur + 8 > bytes.len() {
        return Err(Error::Decode("unexpected end of compiled module".to_string()));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[*cur..*cur + 8]);
    *cur += 8;
    Ok(u64::from_le_bytes(buf))
}

fn read_blob<'b>(bytes: &'b [u8], cur: &mut usize) -> Result<&'b [u8], Error> {
    let len = read_u32(bytes, cur)? as usize;
    if *cur + len > bytes.len() {
        return Err(Error::Decode("blob overruns compiled module".to_string()));
    }
    let out = &bytes[*cur..*cur + len];
    *cur += len;
    Ok(out)
}

fn read_string(bytes: &[u8], cur: &mut usize) -> Result<String, Error> {
    let blob = read_blob(bytes, cur)?;
    String::from_utf8(blob.to_vec())
        .map_err(|_| Error::Decode("invalid UTF-8 in compiled module".to_string()))
}

fn read_pos(bytes: &[u8], cur: &mut usize) -> Result<Position, Error> {
    let line = read_u32(bytes, cur)?;
    let col = read_u32(bytes, cur)?;
    Ok(Position::new(line, col))
}
