//! Text listing of generated instructions.

use std::collections::HashSet;
use std::fmt::Write;

use crate::instr::{FuncrefTarget, Instr, JumpWhen, Op, Special};
use crate::script::CompiledFunc;

/// Listing of every function, separated by blank lines.
pub fn listing(funcs: &[CompiledFunc]) -> String {
    let mut out = String::new();
    for (i, func) in funcs.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let slot = match func.dfunc_idx {
            Some(idx) => format!("dfunc {idx}"),
            None => "legacy".to_string(),
        };
        let closure = if func.closure { ", closure" } else { "" };
        let _ = writeln!(out, "{} ({slot}, {:?}{closure})", func.name, func.compile_type);
        disassemble(&mut out, func.instrs.instrs(), 0);
    }
    out
}

/// Append a listing of `instrs` to `out`. Lines that start a new source
/// line are marked with it; jump targets get a `>`.
pub fn disassemble(out: &mut String, instrs: &[Instr], indent: usize) {
    let targets = jump_targets(instrs);
    let prefix = "  ".repeat(indent);
    let mut lnum = 0;

    for (idx, instr) in instrs.iter().enumerate() {
        if instr.lnum != lnum {
            lnum = instr.lnum;
            let _ = writeln!(out, "{prefix}  -- line {lnum}");
        }
        let mark = if targets.contains(&idx) { '>' } else { ' ' };
        let operands = operands(&instr.op);
        if operands.is_empty() {
            let _ = writeln!(out, "{prefix}{mark}{idx:4} {}", instr.op.name());
        } else {
            let _ = writeln!(out, "{prefix}{mark}{idx:4} {} {operands}", instr.op.name());
        }
        match &instr.op {
            Op::Substitute(sub) => disassemble(out, &sub.instrs, indent + 2),
            Op::InstrBlock(nested) => disassemble(out, nested, indent + 2),
            _ => {}
        }
    }
}

fn jump_targets(instrs: &[Instr]) -> HashSet<usize> {
    instrs
        .iter()
        .filter_map(|i| match &i.op {
            Op::Jump { target, .. } | Op::JumpIfArgSet { target, .. } => *target,
            Op::For { end, .. } => *end,
            Op::TryCont { target, .. } => Some(*target),
            _ => None,
        })
        .collect()
}

fn target(t: &Option<usize>) -> String {
    match t {
        Some(t) => t.to_string(),
        None => "?".to_string(),
    }
}

fn operands(op: &Op) -> String {
    match op {
        Op::PushNr(n) => n.to_string(),
        Op::PushBool(b) => b.to_string(),
        Op::PushSpecial(Special::None) => "v:none".to_string(),
        Op::PushSpecial(Special::Null) => "v:null".to_string(),
        Op::PushF(f) => format!("{f:?}"),
        Op::PushS(Some(s)) => format!("{s:?}"),
        Op::PushS(None) => "NULL".to_string(),
        Op::PushBlob(b) => format!("0z{}", b.0.iter().map(|byte| format!("{byte:02X}")).collect::<String>()),
        Op::PushJob(Some(j)) => format!("job {} {:?}", j.0.id, j.0.cmd),
        Op::PushChannel(Some(c)) => format!("channel {}", c.0.id),
        Op::PushJob(None) | Op::PushChannel(None) => "no process".to_string(),
        Op::PushFunc(Some(name)) => format!("\"{name}\""),
        Op::PushFunc(None) => "[none]".to_string(),
        Op::Autoload(name) => name.clone(),

        Op::Load(idx) | Op::Store(idx) => format!("${idx}"),
        Op::LoadOuter(o) | Op::StoreOuter(o) => format!("level {} ${}", o.depth, o.idx),
        Op::LoadV(idx) | Op::StoreV(idx) => match crate::generate::VIM_VARS.get(*idx) {
            Some((name, _)) => format!("v:{name}"),
            None => format!("v:{idx}"),
        },
        Op::LoadReg(c) | Op::StoreReg(c) => format!("@{c}"),
        Op::LoadNs { ns, name } | Op::StoreNs { ns, name } => format!("{}{name}", ns.prefix()),
        Op::LoadS(s) | Op::StoreS(s) => format!("s:{} from script {}", s.name, s.sid),
        Op::LoadScript(s) | Op::StoreScript(s) => format!("[{}] in script {}", s.idx, s.sid),
        Op::StoreNr { idx, val } => format!("{val} in ${idx}"),
        Op::StoreOpt(o) | Op::StoreFuncOpt(o) => format!("&{} flags {}", o.name, o.flags),
        Op::Unlet { name, forceit, .. } => format!("{}{name}", if *forceit { "! " } else { "" }),

        Op::OpNr(e) | Op::OpFloat(e) | Op::OpAny(e) | Op::AddList(e) => e.symbol().to_string(),
        Op::Compare { op, ic, .. } => format!("{}{}", op.symbol(), if *ic { "?" } else { "" }),
        Op::ToBool { invert, offset } => format!("{}{offset}", if *invert { "!" } else { "" }),
        Op::ToString { offset, tolerant } | Op::ToStringAny { offset, tolerant } => {
            format!("stack[{offset}]{}", if *tolerant { " tolerant" } else { "" })
        }
        Op::CheckType(c) if c.arg_idx > 0 => format!("{} stack[{}] arg {}", c.ty, c.offset, c.arg_idx),
        Op::CheckType(c) => format!("{} stack[{}]", c.ty, c.offset),
        Op::SetType(t) => t.to_string(),
        Op::GetItem { index, with_op } => format!("{index}{}", if *with_op { " with op" } else { "" }),
        Op::StringMember(name) => name.clone(),
        Op::CheckLen { min_len, more_ok } => format!("{}{min_len}", if *more_ok { ">= " } else { "" }),
        Op::Slice(n) | Op::NewList(n) | Op::NewDict(n) | Op::ExecConcat(n) => n.to_string(),
        Op::Shuffle { item, up } => format!("{item} up {up}"),

        Op::Funcref(FuncrefTarget::Compiled { dfunc_idx, func }) => format!("{} [{dfunc_idx}]", func.name()),
        Op::Funcref(FuncrefTarget::ByName(name)) => name.clone(),
        Op::NewFunc { lambda, global: Some(g) } => format!("{lambda} {g}"),
        Op::NewFunc { lambda, global: None } => lambda.clone(),
        Op::Def(Some(name)) => name.clone(),
        Op::DCall { func, dfunc_idx, argcount } => format!("{}({argcount}) [{dfunc_idx}]", func.name()),
        Op::UCall { name, argcount } => format!("{name}(argc {argcount})"),
        Op::PCall { argcount, ref_below_args } => {
            format!("{}argc {argcount}", if *ref_below_args { "top " } else { "" })
        }
        Op::BCall { idx, argcount } => match crate::builtins::get(*idx) {
            Ok(b) => format!("{}(argc {argcount})", b.name),
            Err(_) => format!("#{idx}(argc {argcount})"),
        },

        Op::Jump { when, target: t } => {
            let when = match when {
                JumpWhen::Always => "ALWAYS",
                JumpWhen::IfFalse => "IF_FALSE",
                JumpWhen::IfTrue => "IF_TRUE",
            };
            format!("{when} -> {}", target(t))
        }
        Op::JumpIfArgSet { arg_off, target: t } => format!("arg[{arg_off}] -> {}", target(t)),
        Op::For { loop_idx, end } => format!("${loop_idx} -> {}", target(end)),
        Op::Try(t) => format!(
            "catch -> {}, finally -> {}, endtry -> {}",
            target(&t.catch),
            target(&t.finally),
            target(&t.endtry)
        ),
        Op::TryCont { levels, target } => format!("{levels} levels -> {target}"),

        Op::Echo { count, .. } | Op::MultExpr { count, .. } => count.to_string(),
        Op::Exec { line, .. } | Op::LegacyEval(line) | Op::Range(line) => line.clone(),
        Op::Unpack { count, semicolon } => format!("{count}{}", if *semicolon { " ;" } else { "" }),
        Op::Put { regname, lnum } => format!("{regname} {lnum}"),
        Op::CmdMod(m) => {
            let mut parts = flag_names(crate::instr::CMOD_NAMES, m.flags);
            parts.extend(flag_names(crate::instr::SPLIT_NAMES, m.split));
            if m.tab != 0 {
                parts.push(format!("tab {}", m.tab - 1));
            }
            if let Some(v) = m.verbose {
                parts.push(format!("verbose {v}"));
            }
            if let Some(f) = &m.filter {
                parts.push(format!("filter{} /{}/", if f.force { "!" } else { "" }, f.regex.as_str()));
            }
            parts.join(" ")
        }
        Op::Substitute(sub) => sub.cmd.clone(),
        Op::Debug { var_count, break_lnum } => format!("line {break_lnum} varcount {var_count}"),

        _ => String::new(),
    }
}

/// Names of the flags set in `flags`, first name only for aliases.
fn flag_names(table: &[(&str, u32)], flags: u32) -> Vec<String> {
    let mut seen = 0;
    let mut names = Vec::new();
    for (name, flag) in table {
        if flags & flag != 0 && seen & flag == 0 {
            seen |= flag;
            names.push(name.to_string());
        }
    }
    names
}
