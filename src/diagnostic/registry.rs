/// An entry in the error code registry.
pub struct ErrorEntry {
    pub code: &'static str,
    pub short: &'static str, // brief description for tooling
    pub long: &'static str,  // full explanation for --explain
}

/// All stable error codes of the generator and the script driver.
pub static REGISTRY: &[ErrorEntry] = &[
    // ── Types ───────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "ISN-T001",
        short: "wrong argument type for +",
        long: r#"## ISN-T001: wrong argument type for +

`+` adds numbers and floats, concatenates two lists or two blobs. Any
other pair of statically known types is rejected.

**Example:**

    str "a"
    nr 1
    op +

Convert the string first, or use string concatenation instead.
"#,
    },
    ErrorEntry {
        code: "ISN-T002",
        short: "operator requires number or float arguments",
        long: r#"## ISN-T002: operator requires number or float arguments

`-`, `*` and `/` only work on numbers and floats. Operands of type any
are checked when the instruction runs.

**Example:**

    load local 0 list<number>
    nr 2
    op *
"#,
    },
    ErrorEntry {
        code: "ISN-T003",
        short: "% requires number arguments",
        long: r#"## ISN-T003: % requires number arguments

The remainder operator only takes numbers. A float operand is an error,
unlike for the other arithmetic operators.

**Example:**

    float 2.5
    nr 2
    op %
"#,
    },
    ErrorEntry {
        code: "ISN-T004",
        short: "cannot use is/isnot with this type",
        long: r#"## ISN-T004: cannot use is/isnot with this type

`is` and `isnot` compare identity. Bools, specials, numbers and floats
are values without an identity, compare them with `==` or `!=`.

**Example:**

    nr 2
    nr 3
    cmp is
"#,
    },
    ErrorEntry {
        code: "ISN-T005",
        short: "cannot compare these types",
        long: r#"## ISN-T005: cannot compare these types

Both operands of a comparison must have compatible types. Lists, dicts,
blobs and functions only support `==`, `!=`, `is` and `isnot`. A bool or
special can't be compared with a value of another type.

**Example:**

    bool true
    nr 5
    cmp ==
"#,
    },
    ErrorEntry {
        code: "ISN-T006",
        short: "cannot convert type to string",
        long: r#"## ISN-T006: cannot convert type to string

Only numbers, floats, bools and specials convert to a string. Lists are
accepted when the conversion is tolerant, as for `:echo`.

**Example:**

    load local 0 dict<number>
    tostring
"#,
    },
    ErrorEntry {
        code: "ISN-T007",
        short: "argument type mismatch",
        long: r#"## ISN-T007: argument type mismatch

An argument of a function call has a type that can never match the
declared parameter type. When the argument is of type any a runtime
check is generated instead.

**Example:**

    func Twice(number): number
    begin Main
      str "two"
      call Twice 1
    end
"#,
    },
    ErrorEntry {
        code: "ISN-T008",
        short: "type mismatch",
        long: r#"## ISN-T008: type mismatch

A value does not have the type required where it is used, for example
an item added to a list with a different member type.

**Example:**

    load local 0 list<number>
    str "x"
    listappend
"#,
    },
    ErrorEntry {
        code: "ISN-T009",
        short: "dictionary required",
        long: r#"## ISN-T009: dictionary required

`.key` member access needs a dictionary.

**Example:**

    nr 3
    member key
"#,
    },
    ErrorEntry {
        code: "ISN-T010",
        short: "list required",
        long: r#"## ISN-T010: list required

Indexing, appending to a list and list builtins need a list value.

**Example:**

    nr 3
    getitem 0
"#,
    },
    ErrorEntry {
        code: "ISN-T011",
        short: "value is not callable",
        long: r#"## ISN-T011: value is not callable

A call through a reference needs a value of type func or partial, or
of type any when it is only known at runtime.

**Example:**

    nr 1
    pcall 0 Ref number
"#,
    },
    ErrorEntry {
        code: "ISN-T012",
        short: "wrong argument type for builtin",
        long: r#"## ISN-T012: wrong argument type for builtin

A builtin function got an argument of a type it does not accept.

**Example:**

    str "abc"
    bcall sqrt 1
"#,
    },
    // ── Arity ───────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "ISN-A001",
        short: "too many arguments",
        long: r#"## ISN-A001: too many arguments

A function was called with more arguments than it declares. A function
with a variadic parameter accepts any number of extra arguments.

**Example:**

    func Add(number, number): number
    begin Main
      nr 1
      nr 2
      nr 3
      call Add 3
    end
"#,
    },
    ErrorEntry {
        code: "ISN-A002",
        short: "not enough arguments",
        long: r#"## ISN-A002: not enough arguments

A function was called with fewer arguments than its required
parameters. Parameters marked with `?` have a default value and may be
left out.

**Example:**

    func Add(number, number, ?number): number
    begin Main
      nr 1
      call Add 1
    end
"#,
    },
    // ── Calls and constants ─────────────────────────────────────────────────
    ErrorEntry {
        code: "ISN-C001",
        short: "call to function that failed to compile",
        long: r#"## ISN-C001: call to function that failed to compile

The called function had to be compiled first and that failed, or it
failed before. It is not compiled again.

**Example:**

    func Broken() broken
    begin Main
      call Broken 0
    end
"#,
    },
    ErrorEntry {
        code: "ISN-C002",
        short: "unknown builtin function",
        long: r#"## ISN-C002: unknown builtin function

A builtin call referred to an entry that is not in the builtin table.
"#,
    },
    ErrorEntry {
        code: "ISN-C003",
        short: "unknown v: variable",
        long: r#"## ISN-C003: unknown v: variable

Only predefined `v:` variables exist, such as `v:count` or `v:errmsg`.

**Example:**

    load v:nosuchthing
"#,
    },
    ErrorEntry {
        code: "ISN-C004",
        short: "constant type not supported",
        long: r#"## ISN-C004: constant type not supported

Jobs and channels can't be pushed as a generic constant, use the job or
channel push instead.
"#,
    },
    // ── Scripts ─────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "ISN-S001",
        short: "unexpected character",
        long: r#"## ISN-S001: unexpected character

The script contains a character that can't start a token. Comments
start with `--`, strings are double quoted and end on the same line.

**Example:**

    nr 1 # one
"#,
    },
    ErrorEntry {
        code: "ISN-S002",
        short: "syntax error",
        long: r#"## ISN-S002: syntax error

A directive is unknown, misses an operand or has one too many. Each
line holds exactly one directive.

**Example:**

    nr
"#,
    },
    ErrorEntry {
        code: "ISN-S003",
        short: "undefined function",
        long: r#"## ISN-S003: undefined function

A call or function reference names a function that is neither declared
with `func` nor given a body with `begin`, or a builtin that doesn't
exist.

**Example:**

    begin Main
      call Missing 0
    end
"#,
    },
    ErrorEntry {
        code: "ISN-S004",
        short: "unbalanced block",
        long: r#"## ISN-S004: unbalanced block

Every `begin`, `while`, `for`, `block`, `if`, `try`, `mod`, `sub` and
`instr` needs its matching closing directive, in nesting order.

**Example:**

    begin Main
      while
    end
"#,
    },
    ErrorEntry {
        code: "ISN-S005",
        short: "undefined label",
        long: r#"## ISN-S005: undefined label

A jump names a label that is not defined in the same function body.

**Example:**

    begin Main
      jump always done
    end
"#,
    },
    ErrorEntry {
        code: "ISN-S006",
        short: "invalid pattern",
        long: r#"## ISN-S006: invalid pattern

The pattern of a `filter` command modifier is not a valid regular
expression.

**Example:**

    mod filter "("
"#,
    },
    ErrorEntry {
        code: "ISN-S007",
        short: "stack underflow",
        long: r#"## ISN-S007: stack underflow

A directive takes more values from the stack than the directives before
it pushed. `op` and `cmp` need two values, `echo N` needs N, `pcall N`
needs the N arguments and the function reference.

**Example:**

    begin Main
      nr 1
      op +
    end
"#,
    },
];

pub fn lookup(code: &str) -> Option<&'static ErrorEntry> {
    REGISTRY.iter().find(|e| e.code == code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_code() {
        let e = lookup("ISN-T005").expect("ISN-T005 should be in registry");
        assert_eq!(e.code, "ISN-T005");
        assert!(!e.short.is_empty());
        assert!(e.long.contains("ISN-T005"));
    }

    #[test]
    fn lookup_unknown_returns_none() {
        assert!(lookup("ISN-XXXX").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn all_codes_unique() {
        let mut codes: Vec<&str> = REGISTRY.iter().map(|e| e.code).collect();
        codes.sort_unstable();
        let len_before = codes.len();
        codes.dedup();
        assert_eq!(codes.len(), len_before, "duplicate codes in registry");
    }

    #[test]
    fn all_codes_have_content() {
        for entry in REGISTRY {
            assert!(!entry.short.is_empty(), "{} missing short description", entry.code);
            assert!(entry.long.starts_with(&format!("## {}", entry.code)), "{} long text heading", entry.code);
        }
    }
}
