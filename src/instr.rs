use std::rc::Rc;

use serde::{Serialize, Serializer};

use crate::func::FuncHandle;
use crate::types::Type;

// ── Instruction ─────────────────────────────────────────────────────

/// One generated instruction: an opcode with its operands and the 1-based
/// source line it was generated for.
#[derive(Debug, Serialize)]
pub struct Instr {
    pub op: Op,
    pub lnum: u32,
}

/// Operator carried by arithmetic and comparison instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExprOp {
    Add,
    Sub,
    Mult,
    Div,
    Rem,
    /// `+` on lists producing a new list.
    Copy,
    /// `+=` on lists appending in place.
    Append,
    Equal,
    NEqual,
    Greater,
    GEqual,
    Smaller,
    SEqual,
    Match,
    NoMatch,
    Is,
    IsNot,
}

impl ExprOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ExprOp::Add | ExprOp::Copy => "+",
            ExprOp::Append => "+=",
            ExprOp::Sub => "-",
            ExprOp::Mult => "*",
            ExprOp::Div => "/",
            ExprOp::Rem => "%",
            ExprOp::Equal => "==",
            ExprOp::NEqual => "!=",
            ExprOp::Greater => ">",
            ExprOp::GEqual => ">=",
            ExprOp::Smaller => "<",
            ExprOp::SEqual => "<=",
            ExprOp::Match => "=~",
            ExprOp::NoMatch => "!~",
            ExprOp::Is => "is",
            ExprOp::IsNot => "isnot",
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, ExprOp::Equal | ExprOp::NEqual)
    }

    pub fn is_identity(self) -> bool {
        matches!(self, ExprOp::Is | ExprOp::IsNot)
    }
}

/// Operand kind a comparison instruction was specialized for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompareKind {
    Bool,
    Special,
    Nr,
    Float,
    String,
    Blob,
    List,
    Dict,
    Func,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JumpWhen {
    Always,
    IfFalse,
    IfTrue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Special {
    None,
    Null,
}

/// Namespace of a variable accessed by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Namespace {
    Global,
    Autoload,
    Buffer,
    Window,
    Tab,
    Env,
    Option,
}

impl Namespace {
    pub fn prefix(self) -> &'static str {
        match self {
            Namespace::Global | Namespace::Autoload => "g:",
            Namespace::Buffer => "b:",
            Namespace::Window => "w:",
            Namespace::Tab => "t:",
            Namespace::Env => "$",
            Namespace::Option => "&",
        }
    }
}

/// Script variable addressed by script id and slot index, checked against
/// the script's reload sequence at runtime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptRef {
    pub sid: u32,
    pub idx: usize,
    pub seq: u32,
    pub ty: Type,
}

/// Script variable of an old-style script, looked up by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptName {
    pub name: String,
    pub sid: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OuterRef {
    pub idx: usize,
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreOpt {
    pub name: String,
    pub flags: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckType {
    pub ty: Type,
    pub offset: i32,
    pub arg_idx: i32,
}

/// Jump targets of a `:try` block, patched as the block is compiled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TryRef {
    pub catch: Option<usize>,
    pub finally: Option<usize>,
    pub endtry: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TryPart {
    Catch,
    Finally,
    EndTry,
}

/// Target of a function reference.
#[derive(Debug, Serialize)]
pub enum FuncrefTarget {
    /// Function that has a compiled-function slot.
    Compiled { dfunc_idx: usize, func: FuncHandle },
    /// Function resolved by name when the reference is evaluated.
    ByName(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecKind {
    Exec,
    ExecSplit,
    ExecRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MultKind {
    Execute,
    EchoMsg,
    EchoErr,
    EchoConsole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnletKind {
    Var,
    Env,
}

/// `:s/pat/\=expr/` with the expression compiled into its own list.
#[derive(Debug, Serialize)]
pub struct Substitute {
    pub cmd: String,
    pub instrs: Vec<Instr>,
}

// ── Command modifiers ───────────────────────────────────────────────

pub const CMOD_SANDBOX: u32 = 0x0001;
pub const CMOD_SILENT: u32 = 0x0002;
pub const CMOD_ERRSILENT: u32 = 0x0004;
pub const CMOD_UNSILENT: u32 = 0x0008;
pub const CMOD_NOAUTOCMD: u32 = 0x0010;
pub const CMOD_HIDE: u32 = 0x0020;
pub const CMOD_BROWSE: u32 = 0x0040;
pub const CMOD_CONFIRM: u32 = 0x0080;
pub const CMOD_KEEPALT: u32 = 0x0100;
pub const CMOD_KEEPMARKS: u32 = 0x0200;
pub const CMOD_KEEPJUMPS: u32 = 0x0400;
pub const CMOD_LOCKMARKS: u32 = 0x0800;
pub const CMOD_KEEPPATTERNS: u32 = 0x1000;
pub const CMOD_NOSWAPFILE: u32 = 0x2000;

/// Modifier names accepted in front of a command, with their flag.
pub const CMOD_NAMES: &[(&str, u32)] = &[
    ("sandbox", CMOD_SANDBOX),
    ("silent", CMOD_SILENT),
    ("silent!", CMOD_ERRSILENT),
    ("unsilent", CMOD_UNSILENT),
    ("noautocmd", CMOD_NOAUTOCMD),
    ("hide", CMOD_HIDE),
    ("browse", CMOD_BROWSE),
    ("confirm", CMOD_CONFIRM),
    ("keepalt", CMOD_KEEPALT),
    ("keepmarks", CMOD_KEEPMARKS),
    ("keepjumps", CMOD_KEEPJUMPS),
    ("lockmarks", CMOD_LOCKMARKS),
    ("keeppatterns", CMOD_KEEPPATTERNS),
    ("noswapfile", CMOD_NOSWAPFILE),
];

pub const WSP_VERT: u32 = 0x01;
pub const WSP_TOP: u32 = 0x04;
pub const WSP_BOT: u32 = 0x08;
pub const WSP_BELOW: u32 = 0x20;
pub const WSP_ABOVE: u32 = 0x40;

/// Split modifiers with their flag.
pub const SPLIT_NAMES: &[(&str, u32)] = &[
    ("vertical", WSP_VERT),
    ("topleft", WSP_TOP),
    ("botright", WSP_BOT),
    ("belowright", WSP_BELOW),
    ("rightbelow", WSP_BELOW),
    ("aboveleft", WSP_ABOVE),
    ("leftabove", WSP_ABOVE),
];

/// `:filter /pat/` modifier. The compiled pattern is owned by whoever holds
/// the modifier.
#[derive(Debug)]
pub struct CmdFilter {
    pub regex: regex::Regex,
    pub force: bool,
}

/// Command modifiers in effect for one command.
#[derive(Debug, Default, Serialize)]
pub struct CmdMod {
    pub flags: u32,
    pub split: u32,
    pub tab: i32,
    pub verbose: Option<i32>,
    #[serde(serialize_with = "serialize_filter")]
    pub filter: Option<CmdFilter>,
}

impl CmdMod {
    /// Whether any modifier is set, so the command needs a CMDMOD.
    pub fn is_set(&self) -> bool {
        self.flags != 0 || self.split != 0 || self.tab != 0 || self.verbose.is_some() || self.filter.is_some()
    }
}

fn serialize_filter<S: Serializer>(filter: &Option<CmdFilter>, s: S) -> Result<S::Ok, S::Error> {
    match filter {
        Some(f) => s.serialize_some(f.regex.as_str()),
        None => s.serialize_none(),
    }
}

// ── Shared runtime handles ──────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
pub struct Job {
    pub id: u32,
    pub cmd: String,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Channel {
    pub id: u32,
}

/// Reference-counted handle; the instruction holding it keeps the value alive.
#[derive(Debug, PartialEq, Eq)]
pub struct Handle<T>(pub Rc<T>);

// Cloning shares the value, it never copies it.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Handle(Rc::clone(&self.0))
    }
}

impl<T> Handle<T> {
    pub fn new(value: T) -> Self {
        Handle(Rc::new(value))
    }

    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl<T: std::fmt::Debug> Serialize for Handle<T> {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{:?}", self.0))
    }
}

pub type BlobHandle = Handle<Vec<u8>>;
pub type JobHandle = Handle<Job>;
pub type ChannelHandle = Handle<Channel>;

// ── Opcodes ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub enum Op {
    // constants
    PushNr(i64),
    PushBool(bool),
    PushSpecial(Special),
    PushF(f64),
    PushS(Option<String>),
    PushBlob(BlobHandle),
    PushJob(Option<JobHandle>),
    PushChannel(Option<ChannelHandle>),
    PushFunc(Option<String>),
    Autoload(String),

    // variables
    Load(usize),
    LoadOuter(OuterRef),
    LoadV(usize),
    LoadReg(char),
    LoadNs { ns: Namespace, name: String },
    LoadS(ScriptName),
    LoadScript(Box<ScriptRef>),
    Store(usize),
    StoreOuter(OuterRef),
    StoreNr { idx: usize, val: i64 },
    StoreV(usize),
    StoreReg(char),
    StoreNs { ns: Namespace, name: String },
    StoreOpt(StoreOpt),
    StoreFuncOpt(StoreOpt),
    StoreS(ScriptName),
    StoreScript(Box<ScriptRef>),
    Unlet { kind: UnletKind, name: String, forceit: bool },
    LockConst,

    // expressions
    OpNr(ExprOp),
    OpFloat(ExprOp),
    OpAny(ExprOp),
    AddList(ExprOp),
    AddBlob,
    Compare { kind: CompareKind, op: ExprOp, ic: bool },
    ToBool { invert: bool, offset: i32 },
    CondToBool,
    ToString { offset: i32, tolerant: bool },
    ToStringAny { offset: i32, tolerant: bool },
    CheckType(Box<CheckType>),
    SetType(Box<Type>),
    GetItem { index: i64, with_op: bool },
    StringMember(String),
    CheckLen { min_len: usize, more_ok: bool },
    Slice(usize),
    NewList(usize),
    NewDict(usize),
    ListAppend,
    BlobAppend,
    Shuffle { item: usize, up: usize },

    // functions
    Funcref(FuncrefTarget),
    NewFunc { lambda: String, global: Option<String> },
    Def(Option<String>),
    DCall { func: FuncHandle, dfunc_idx: usize, argcount: usize },
    UCall { name: String, argcount: usize },
    PCall { argcount: usize, ref_below_args: bool },
    PCallEnd,
    BCall { idx: usize, argcount: usize },
    Return,
    ReturnVoid,

    // control flow
    Jump { when: JumpWhen, target: Option<usize> },
    JumpIfArgSet { arg_off: i32, target: Option<usize> },
    For { loop_idx: usize, end: Option<usize> },
    Try(Box<TryRef>),
    Catch,
    Finally,
    EndTry,
    Throw,
    TryCont { levels: usize, target: usize },

    // commands
    Echo { with_white: bool, count: usize },
    MultExpr { kind: MultKind, count: usize },
    Exec { kind: ExecKind, line: String },
    LegacyEval(String),
    ExecConcat(usize),
    Range(String),
    Unpack { count: usize, semicolon: bool },
    Put { regname: char, lnum: i64 },
    CmdMod(Box<CmdMod>),
    CmdModRev,
    Substitute(Box<Substitute>),
    InstrBlock(Vec<Instr>),
    Debug { var_count: usize, break_lnum: u32 },
    ProfStart,
    ProfEnd,
    Drop,
    Finish,
}

impl Op {
    /// Mnemonic used in listings.
    pub fn name(&self) -> &'static str {
        match self {
            Op::PushNr(_) => "PUSHNR",
            Op::PushBool(_) => "PUSH",
            Op::PushSpecial(_) => "PUSHSPEC",
            Op::PushF(_) => "PUSHF",
            Op::PushS(_) => "PUSHS",
            Op::PushBlob(_) => "PUSHBLOB",
            Op::PushJob(_) => "PUSHJOB",
            Op::PushChannel(_) => "PUSHCHANNEL",
            Op::PushFunc(_) => "PUSHFUNC",
            Op::Autoload(_) => "AUTOLOAD",
            Op::Load(_) => "LOAD",
            Op::LoadOuter(_) => "LOADOUTER",
            Op::LoadV(_) => "LOADV",
            Op::LoadReg(_) => "LOADREG",
            Op::LoadNs { ns, .. } => match ns {
                Namespace::Global => "LOADG",
                Namespace::Autoload => "LOADAUTO",
                Namespace::Buffer => "LOADB",
                Namespace::Window => "LOADW",
                Namespace::Tab => "LOADT",
                Namespace::Env => "LOADENV",
                Namespace::Option => "LOADOPT",
            },
            Op::LoadS(_) => "LOADS",
            Op::LoadScript(_) => "LOADSCRIPT",
            Op::Store(_) => "STORE",
            Op::StoreOuter(_) => "STOREOUTER",
            Op::StoreNr { .. } => "STORENR",
            Op::StoreV(_) => "STOREV",
            Op::StoreReg(_) => "STOREREG",
            Op::StoreNs { ns, .. } => match ns {
                Namespace::Global => "STOREG",
                Namespace::Autoload => "STOREAUTO",
                Namespace::Buffer => "STOREB",
                Namespace::Window => "STOREW",
                Namespace::Tab => "STORET",
                Namespace::Env => "STOREENV",
                Namespace::Option => "STOREOPT",
            },
            Op::StoreOpt(_) => "STOREOPT",
            Op::StoreFuncOpt(_) => "STOREFUNCOPT",
            Op::StoreS(_) => "STORES",
            Op::StoreScript(_) => "STORESCRIPT",
            Op::Unlet { kind: UnletKind::Var, .. } => "UNLET",
            Op::Unlet { kind: UnletKind::Env, .. } => "UNLETENV",
            Op::LockConst => "LOCKCONST",
            Op::OpNr(_) => "OPNR",
            Op::OpFloat(_) => "OPFLOAT",
            Op::OpAny(_) => "OPANY",
            Op::AddList(_) => "ADDLIST",
            Op::AddBlob => "ADDBLOB",
            Op::Compare { kind, .. } => match kind {
                CompareKind::Bool => "COMPAREBOOL",
                CompareKind::Special => "COMPARESPECIAL",
                CompareKind::Nr => "COMPARENR",
                CompareKind::Float => "COMPAREFLOAT",
                CompareKind::String => "COMPARESTRING",
                CompareKind::Blob => "COMPAREBLOB",
                CompareKind::List => "COMPARELIST",
                CompareKind::Dict => "COMPAREDICT",
                CompareKind::Func => "COMPAREFUNC",
                CompareKind::Any => "COMPAREANY",
            },
            Op::ToBool { .. } => "2BOOL",
            Op::CondToBool => "COND2BOOL",
            Op::ToString { .. } => "2STRING",
            Op::ToStringAny { .. } => "2STRING_ANY",
            Op::CheckType(_) => "CHECKTYPE",
            Op::SetType(_) => "SETTYPE",
            Op::GetItem { .. } => "GETITEM",
            Op::StringMember(_) => "STRINGMEMBER",
            Op::CheckLen { .. } => "CHECKLEN",
            Op::Slice(_) => "SLICE",
            Op::NewList(_) => "NEWLIST",
            Op::NewDict(_) => "NEWDICT",
            Op::ListAppend => "LISTAPPEND",
            Op::BlobAppend => "BLOBAPPEND",
            Op::Shuffle { .. } => "SHUFFLE",
            Op::Funcref(_) => "FUNCREF",
            Op::NewFunc { .. } => "NEWFUNC",
            Op::Def(_) => "DEF",
            Op::DCall { .. } => "DCALL",
            Op::UCall { .. } => "UCALL",
            Op::PCall { .. } => "PCALL",
            Op::PCallEnd => "PCALL_END",
            Op::BCall { .. } => "BCALL",
            Op::Return => "RETURN",
            Op::ReturnVoid => "RETURN_VOID",
            Op::Jump { .. } => "JUMP",
            Op::JumpIfArgSet { .. } => "JUMP_IF_ARG_SET",
            Op::For { .. } => "FOR",
            Op::Try(_) => "TRY",
            Op::Catch => "CATCH",
            Op::Finally => "FINALLY",
            Op::EndTry => "ENDTRY",
            Op::Throw => "THROW",
            Op::TryCont { .. } => "TRYCONT",
            Op::Echo { .. } => "ECHO",
            Op::MultExpr { kind, .. } => match kind {
                MultKind::Execute => "EXECUTE",
                MultKind::EchoMsg => "ECHOMSG",
                MultKind::EchoErr => "ECHOERR",
                MultKind::EchoConsole => "ECHOCONSOLE",
            },
            Op::Exec { kind, .. } => match kind {
                ExecKind::Exec => "EXEC",
                ExecKind::ExecSplit => "EXEC_SPLIT",
                ExecKind::ExecRange => "EXECRANGE",
            },
            Op::LegacyEval(_) => "LEGACY_EVAL",
            Op::ExecConcat(_) => "EXECCONCAT",
            Op::Range(_) => "RANGE",
            Op::Unpack { .. } => "UNPACK",
            Op::Put { .. } => "PUT",
            Op::CmdMod(_) => "CMDMOD",
            Op::CmdModRev => "CMDMOD_REV",
            Op::Substitute(_) => "SUBSTITUTE",
            Op::InstrBlock(_) => "INSTR",
            Op::Debug { .. } => "DEBUG",
            Op::ProfStart => "PROFILE START",
            Op::ProfEnd => "PROFILE END",
            Op::Drop => "DROP",
            Op::Finish => "FINISH",
        }
    }
}

// ── Owned resources ─────────────────────────────────────────────────

/// Tally of the resources instructions own, released when they are dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Owned {
    pub strings: usize,
    pub boxed: usize,
    pub types: usize,
    pub handles: usize,
    pub func_refs: usize,
    pub patterns: usize,
    pub nested: usize,
}

impl std::ops::AddAssign for Owned {
    fn add_assign(&mut self, rhs: Owned) {
        self.strings += rhs.strings;
        self.boxed += rhs.boxed;
        self.types += rhs.types;
        self.handles += rhs.handles;
        self.func_refs += rhs.func_refs;
        self.patterns += rhs.patterns;
        self.nested += rhs.nested;
    }
}

impl Instr {
    /// Resources this instruction owns, including those of nested lists up
    /// to their FINISH.
    pub fn owned(&self) -> Owned {
        let mut o = Owned::default();
        match &self.op {
            Op::PushS(s) | Op::PushFunc(s) | Op::Def(s) => o.strings += usize::from(s.is_some()),
            Op::PushBlob(_) => o.handles += 1,
            Op::PushJob(h) => o.handles += usize::from(h.is_some()),
            Op::PushChannel(h) => o.handles += usize::from(h.is_some()),
            Op::Autoload(_)
            | Op::LoadNs { .. }
            | Op::StoreNs { .. }
            | Op::LoadS(_)
            | Op::StoreS(_)
            | Op::StoreOpt(_)
            | Op::StoreFuncOpt(_)
            | Op::Unlet { .. }
            | Op::StringMember(_)
            | Op::UCall { .. }
            | Op::Exec { .. }
            | Op::LegacyEval(_)
            | Op::Range(_) => o.strings += 1,
            Op::LoadScript(_) | Op::StoreScript(_) => {
                o.boxed += 1;
                o.types += 1;
            }
            Op::CheckType(_) | Op::SetType(_) => {
                o.boxed += 1;
                o.types += 1;
            }
            Op::Try(_) => o.boxed += 1,
            Op::Funcref(FuncrefTarget::ByName(_)) => o.strings += 1,
            Op::Funcref(FuncrefTarget::Compiled { .. }) | Op::DCall { .. } => o.func_refs += 1,
            Op::NewFunc { global, .. } => o.strings += 1 + usize::from(global.is_some()),
            Op::CmdMod(cmod) => {
                o.boxed += 1;
                o.patterns += usize::from(cmod.filter.is_some());
            }
            Op::Substitute(sub) => {
                o.boxed += 1;
                o.strings += 1;
                o.nested += 1;
                o += owned_list(&sub.instrs);
            }
            Op::InstrBlock(instrs) => {
                o.nested += 1;
                o += owned_list(instrs);
            }
            Op::PushNr(_)
            | Op::PushBool(_)
            | Op::PushSpecial(_)
            | Op::PushF(_)
            | Op::Load(_)
            | Op::LoadOuter(_)
            | Op::LoadV(_)
            | Op::LoadReg(_)
            | Op::Store(_)
            | Op::StoreOuter(_)
            | Op::StoreNr { .. }
            | Op::StoreV(_)
            | Op::StoreReg(_)
            | Op::LockConst
            | Op::OpNr(_)
            | Op::OpFloat(_)
            | Op::OpAny(_)
            | Op::AddList(_)
            | Op::AddBlob
            | Op::Compare { .. }
            | Op::ToBool { .. }
            | Op::CondToBool
            | Op::ToString { .. }
            | Op::ToStringAny { .. }
            | Op::GetItem { .. }
            | Op::CheckLen { .. }
            | Op::Slice(_)
            | Op::NewList(_)
            | Op::NewDict(_)
            | Op::ListAppend
            | Op::BlobAppend
            | Op::Shuffle { .. }
            | Op::PCall { .. }
            | Op::PCallEnd
            | Op::BCall { .. }
            | Op::Return
            | Op::ReturnVoid
            | Op::Jump { .. }
            | Op::JumpIfArgSet { .. }
            | Op::For { .. }
            | Op::Catch
            | Op::Finally
            | Op::EndTry
            | Op::Throw
            | Op::TryCont { .. }
            | Op::Echo { .. }
            | Op::MultExpr { .. }
            | Op::ExecConcat(_)
            | Op::Unpack { .. }
            | Op::Put { .. }
            | Op::CmdModRev
            | Op::Debug { .. }
            | Op::ProfStart
            | Op::ProfEnd
            | Op::Drop
            | Op::Finish => {}
        }
        o
    }
}

/// Resources owned by a nested instruction list. The list ends at FINISH.
pub fn owned_list(instrs: &[Instr]) -> Owned {
    let mut o = Owned::default();
    for instr in instrs {
        if matches!(instr.op, Op::Finish) {
            break;
        }
        o += instr.owned();
    }
    o
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instr(op: Op) -> Instr {
        Instr { op, lnum: 1 }
    }

    #[test]
    fn names() {
        assert_eq!(Op::PushNr(1).name(), "PUSHNR");
        assert_eq!(Op::Compare { kind: CompareKind::Float, op: ExprOp::Equal, ic: false }.name(), "COMPAREFLOAT");
        assert_eq!(Op::StoreNs { ns: Namespace::Autoload, name: "a#b".into() }.name(), "STOREAUTO");
        assert_eq!(Op::ToStringAny { offset: -1, tolerant: true }.name(), "2STRING_ANY");
    }

    #[test]
    fn owned_counts_nested_until_finish() {
        let nested = vec![
            instr(Op::PushS(Some("x".into()))),
            instr(Op::Finish),
            instr(Op::PushS(Some("after finish".into()))),
        ];
        let sub = instr(Op::Substitute(Box::new(Substitute { cmd: "s/a/b/".into(), instrs: nested })));
        let o = sub.owned();
        assert_eq!(o.strings, 2);
        assert_eq!(o.nested, 1);
        assert_eq!(o.boxed, 1);
    }

    #[test]
    fn handle_clone_shares_value() {
        let job = Handle::new(Job { id: 3, cmd: "sleep 1".into() });
        let channel = Handle::new(Channel { id: 7 });
        let (job2, channel2) = (job.clone(), channel.clone());
        assert!(Rc::ptr_eq(&job.0, &job2.0));
        assert_eq!((job.strong_count(), channel.strong_count()), (2, 2));
        drop((job2, channel2));
        assert_eq!((job.strong_count(), channel.strong_count()), (1, 1));
    }

    #[test]
    fn cmdmod_is_set() {
        assert!(!CmdMod::default().is_set());
        assert!(CmdMod { flags: CMOD_SILENT, ..Default::default() }.is_set());
        assert!(CmdMod { verbose: Some(0), ..Default::default() }.is_set());
    }

    #[test]
    fn handles_are_shared() {
        let blob = BlobHandle::new(vec![1, 2]);
        let op = Op::PushBlob(blob.clone());
        assert_eq!(blob.strong_count(), 2);
        drop(op);
        assert_eq!(blob.strong_count(), 1);
    }
}
