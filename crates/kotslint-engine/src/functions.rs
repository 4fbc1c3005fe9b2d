//! Template functions available inside repl directives
//!
//! Functions are registered under a `repl_` prefix so Go names such as `and`
//! or `not` do not collide with Jinja keywords. Arguments are always taken
//! as a variadic list and checked here, which keeps arity errors in the Go
//! wording (`wrong number of args for X: want N got M`).

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use indexmap::IndexMap;
use minijinja::value::{Rest, ValueKind};
use minijinja::{Environment, Error, ErrorKind, Output, State, Value, escape_formatter};

/// Prefix of registered function names
pub const FUNCTION_PREFIX: &str = "repl_";

/// Functions whose value is only known at deploy time. At lint time they
/// resolve to the empty string.
pub const DEPLOY_TIME_FUNCTIONS: &[&str] = &[
    "PrivateCACert",
    "LicenseFieldValue",
    "LicenseDockerCfg",
    "Namespace",
    "LocalRegistryHost",
    "LocalRegistryAddress",
    "LocalRegistryNamespace",
    "LocalImageName",
    "ImagePullSecretName",
    "HTTPProxy",
    "HTTPSProxy",
    "NoProxy",
];

const CONFIG_FUNCTIONS: &[&str] = &[
    "ConfigOption",
    "ConfigOptionEquals",
    "ConfigOptionNotEquals",
    "ConfigOptionData",
    "ConfigOptionFilename",
    "ConfigOptionName",
];

const STATIC_FUNCTIONS: &[&str] = &[
    "print",
    "printf",
    "quote",
    "squote",
    "trim",
    "TrimSpace",
    "upper",
    "lower",
    "default",
    "toString",
    "Base64Encode",
    "Base64Decode",
    "Add",
    "Sub",
    "Mult",
    "Div",
    "ParseInt",
    "ParseBool",
    "eq",
    "ne",
    "and",
    "or",
    "not",
    "len",
    "indent",
    "nindent",
];

/// Every function name a directive may call
pub fn function_names() -> Vec<&'static str> {
    CONFIG_FUNCTIONS
        .iter()
        .chain(DEPLOY_TIME_FUNCTIONS)
        .chain(STATIC_FUNCTIONS)
        .copied()
        .collect()
}

/// Name under which a function is registered in the environment
pub fn mangle(name: &str) -> String {
    format!("{FUNCTION_PREFIX}{name}")
}

fn call_error(name: &str, message: impl std::fmt::Display) -> Error {
    Error::new(
        ErrorKind::InvalidOperation,
        format!("error calling {name}: {message}"),
    )
}

fn expect_args(name: &str, args: &[Value], want: usize) -> Result<(), Error> {
    if args.len() != want {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!(
                "wrong number of args for {name}: want {want} got {}",
                args.len()
            ),
        ));
    }
    Ok(())
}

fn expect_min_args(name: &str, args: &[Value], min: usize) -> Result<(), Error> {
    if args.len() < min {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            format!(
                "wrong number of args for {name}: want at least {min} got {}",
                args.len()
            ),
        ));
    }
    Ok(())
}

/// Format a value the way Go's `%v` does for the types templates produce
pub fn go_string(value: &Value) -> String {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => "<nil>".to_string(),
        ValueKind::String => value.as_str().unwrap_or_default().to_string(),
        ValueKind::Bool => value.is_true().to_string(),
        _ => value.to_string(),
    }
}

/// Output formatter printing booleans as Go does (`true`, not `True`)
fn go_formatter(out: &mut Output<'_>, state: &State<'_, '_>, value: &Value) -> Result<(), Error> {
    match value.kind() {
        ValueKind::Bool => escape_formatter(out, state, &Value::from(go_string(value))),
        _ => escape_formatter(out, state, value),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(value: &Value) -> Option<Self> {
        match value.kind() {
            ValueKind::Number => value
                .as_i64()
                .map(Number::Int)
                .or_else(|| f64::try_from(value.clone()).ok().map(Number::Float)),
            ValueKind::String => {
                let s = value.as_str()?.trim();
                s.parse::<i64>()
                    .map(Number::Int)
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(Number::Float))
            }
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Number::Int(i) => Value::from(i),
            Number::Float(f) => Value::from(f),
        }
    }
}

fn numeric_args(name: &str, args: &[Value]) -> Result<(Number, Number), Error> {
    expect_args(name, args, 2)?;
    let a = Number::of(&args[0])
        .ok_or_else(|| call_error(name, format!("{} is not a number", go_string(&args[0]))))?;
    let b = Number::of(&args[1])
        .ok_or_else(|| call_error(name, format!("{} is not a number", go_string(&args[1]))))?;
    Ok((a, b))
}

fn arithmetic(
    name: &'static str,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> impl Fn(Rest<Value>) -> Result<Value, Error> + Send + Sync + 'static {
    move |args: Rest<Value>| -> Result<Value, Error> {
        let (a, b) = numeric_args(name, &args)?;
        let result = match (a, b) {
            (Number::Int(a), Number::Int(b)) => match int_op(a, b) {
                Some(n) => Number::Int(n),
                None => return Err(call_error(name, "integer overflow or division by zero")),
            },
            (a, b) => Number::Float(float_op(a.as_f64(), b.as_f64())),
        };
        Ok(result.into_value())
    }
}

/// Go's `fmt.Sprint`: operands are joined with a space when neither side is
/// a string
pub fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && arg.as_str().is_none() && args[i - 1].as_str().is_none() {
            out.push(' ');
        }
        out.push_str(&go_string(arg));
    }
    out
}

/// Go's `fmt.Sprintf` for the verbs `%s`, `%v`, `%d`, `%q`, `%t` and `%%`
pub fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len() + args.len() * 10);
    let mut chars = format.chars();
    let mut next = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = args.get(next) else {
            out.push_str(&format!("%!{verb}(MISSING)"));
            continue;
        };
        next += 1;

        match verb {
            's' | 'v' => out.push_str(&go_string(arg)),
            'q' => out.push_str(&format!("{:?}", go_string(arg))),
            'd' => match Number::of(arg) {
                Some(Number::Int(i)) if arg.as_str().is_none() => out.push_str(&i.to_string()),
                _ => out.push_str(&format!("%!d({})", go_string(arg))),
            },
            't' if arg.kind() == ValueKind::Bool => out.push_str(&go_string(arg)),
            _ => out.push_str(&format!("%!{verb}({})", go_string(arg))),
        }
    }

    if next < args.len() {
        let extra: Vec<String> = args[next..].iter().map(go_string).collect();
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    out
}

/// Sprig's notion of an empty value, used by `default`
fn is_empty(value: &Value) -> bool {
    match value.kind() {
        ValueKind::Undefined | ValueKind::None => true,
        ValueKind::String => value.as_str().is_some_and(str::is_empty),
        ValueKind::Bool | ValueKind::Number => !value.is_true(),
        _ => value.len() == Some(0),
    }
}

fn comparable(a: &Value, b: &Value) -> bool {
    a.kind() == b.kind()
        || (Number::of(a).is_some()
            && Number::of(b).is_some()
            && a.kind() == ValueKind::Number
            && b.kind() == ValueKind::Number)
        || a.is_none()
        || b.is_none()
}

fn indent_text(spaces: usize, text: &str) -> String {
    let pad = " ".repeat(spaces);
    format!("{pad}{}", text.replace('\n', &format!("\n{pad}")))
}

fn indent_args(name: &str, args: &[Value]) -> Result<(usize, String), Error> {
    expect_args(name, args, 2)?;
    let spaces = match Number::of(&args[0]) {
        Some(Number::Int(n)) if n >= 0 => n as usize,
        _ => return Err(call_error(name, "indent width must be a non-negative integer")),
    };
    Ok((spaces, go_string(&args[1])))
}

fn parse_go_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Register every function on `env`, binding the configuration functions to
/// `options`
pub fn register(env: &mut Environment<'_>, options: Arc<IndexMap<String, String>>) {
    env.set_formatter(go_formatter);
    register_config_functions(env, options);

    for name in DEPLOY_TIME_FUNCTIONS {
        env.add_function(mangle(name), |_args: Rest<Value>| -> Result<Value, Error> {
            Ok(Value::from(""))
        });
    }

    env.add_function(mangle("print"), |args: Rest<Value>| -> Result<Value, Error> {
        Ok(Value::from(sprint(&args)))
    });
    env.add_function(mangle("printf"), |args: Rest<Value>| -> Result<Value, Error> {
        expect_min_args("printf", &args, 1)?;
        Ok(Value::from(sprintf(&go_string(&args[0]), &args[1..])))
    });
    env.add_function(mangle("quote"), |args: Rest<Value>| -> Result<Value, Error> {
        let quoted: Vec<String> = args
            .iter()
            .filter(|a| !a.is_none() && !a.is_undefined())
            .map(|a| format!("{:?}", go_string(a)))
            .collect();
        Ok(Value::from(quoted.join(" ")))
    });
    env.add_function(mangle("squote"), |args: Rest<Value>| -> Result<Value, Error> {
        let quoted: Vec<String> = args
            .iter()
            .filter(|a| !a.is_none() && !a.is_undefined())
            .map(|a| format!("'{}'", go_string(a)))
            .collect();
        Ok(Value::from(quoted.join(" ")))
    });

    for (name, op) in [
        ("trim", str::trim as fn(&str) -> &str),
        ("TrimSpace", str::trim),
    ] {
        env.add_function(mangle(name), move |args: Rest<Value>| -> Result<Value, Error> {
            expect_args(name, &args, 1)?;
            Ok(Value::from(op(&go_string(&args[0]))))
        });
    }
    env.add_function(mangle("upper"), |args: Rest<Value>| -> Result<Value, Error> {
        expect_args("upper", &args, 1)?;
        Ok(Value::from(go_string(&args[0]).to_uppercase()))
    });
    env.add_function(mangle("lower"), |args: Rest<Value>| -> Result<Value, Error> {
        expect_args("lower", &args, 1)?;
        Ok(Value::from(go_string(&args[0]).to_lowercase()))
    });
    env.add_function(mangle("toString"), |args: Rest<Value>| -> Result<Value, Error> {
        expect_args("toString", &args, 1)?;
        Ok(Value::from(go_string(&args[0])))
    });
    env.add_function(mangle("default"), |args: Rest<Value>| -> Result<Value, Error> {
        expect_min_args("default", &args, 1)?;
        match args.get(1) {
            Some(given) if !is_empty(given) => Ok(given.clone()),
            _ => Ok(args[0].clone()),
        }
    });

    env.add_function(mangle("Base64Encode"), |args: Rest<Value>| -> Result<Value, Error> {
        expect_args("Base64Encode", &args, 1)?;
        Ok(Value::from(BASE64.encode(go_string(&args[0]))))
    });
    env.add_function(mangle("Base64Decode"), |args: Rest<Value>| -> Result<Value, Error> {
        expect_args("Base64Decode", &args, 1)?;
        let decoded = BASE64
            .decode(go_string(&args[0]).trim())
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();
        Ok(Value::from(decoded))
    });

    env.add_function(
        mangle("Add"),
        arithmetic("Add", i64::checked_add, |a, b| a + b),
    );
    env.add_function(
        mangle("Sub"),
        arithmetic("Sub", i64::checked_sub, |a, b| a - b),
    );
    env.add_function(
        mangle("Mult"),
        arithmetic("Mult", i64::checked_mul, |a, b| a * b),
    );
    env.add_function(mangle("Div"), move |args: Rest<Value>| -> Result<Value, Error> {
        let (_, divisor) = numeric_args("Div", &args)?;
        if divisor.as_f64() == 0.0 {
            return Err(call_error("Div", "division by zero"));
        }
        arithmetic("Div", i64::checked_div, |a, b| a / b)(args)
    });

    env.add_function(mangle("ParseInt"), |args: Rest<Value>| -> Result<Value, Error> {
        expect_min_args("ParseInt", &args, 1)?;
        let s = go_string(&args[0]);
        s.parse::<i64>().map(Value::from).map_err(|_| {
            call_error(
                "ParseInt",
                format!("strconv.ParseInt: parsing {s:?}: invalid syntax"),
            )
        })
    });
    env.add_function(mangle("ParseBool"), |args: Rest<Value>| -> Result<Value, Error> {
        expect_args("ParseBool", &args, 1)?;
        let s = go_string(&args[0]);
        parse_go_bool(&s).map(Value::from).ok_or_else(|| {
            call_error(
                "ParseBool",
                format!("strconv.ParseBool: parsing {s:?}: invalid syntax"),
            )
        })
    });

    env.add_function(mangle("eq"), |args: Rest<Value>| -> Result<Value, Error> {
        expect_min_args("eq", &args, 2)?;
        let first = &args[0];
        for other in &args[1..] {
            if !comparable(first, other) {
                return Err(call_error("eq", "incompatible types for comparison"));
            }
            if first == other {
                return Ok(Value::from(true));
            }
        }
        Ok(Value::from(false))
    });
    env.add_function(mangle("ne"), |args: Rest<Value>| -> Result<Value, Error> {
        expect_args("ne", &args, 2)?;
        if !comparable(&args[0], &args[1]) {
            return Err(call_error("ne", "incompatible types for comparison"));
        }
        Ok(Value::from(args[0] != args[1]))
    });
    env.add_function(mangle("and"), |args: Rest<Value>| -> Result<Value, Error> {
        expect_min_args("and", &args, 1)?;
        let picked = args
            .iter()
            .find(|a| !a.is_true())
            .unwrap_or(&args[args.len() - 1]);
        Ok(picked.clone())
    });
    env.add_function(mangle("or"), |args: Rest<Value>| -> Result<Value, Error> {
        expect_min_args("or", &args, 1)?;
        let picked = args
            .iter()
            .find(|a| a.is_true())
            .unwrap_or(&args[args.len() - 1]);
        Ok(picked.clone())
    });
    env.add_function(mangle("not"), |args: Rest<Value>| -> Result<Value, Error> {
        expect_args("not", &args, 1)?;
        Ok(Value::from(!args[0].is_true()))
    });
    env.add_function(mangle("len"), |args: Rest<Value>| -> Result<Value, Error> {
        expect_args("len", &args, 1)?;
        let value = &args[0];
        let len = match value.as_str() {
            Some(s) => Some(s.len()),
            None => value.len(),
        };
        len.map(Value::from)
            .ok_or_else(|| call_error("len", format!("len of type {}", value.kind())))
    });
    env.add_function(mangle("indent"), |args: Rest<Value>| -> Result<Value, Error> {
        let (spaces, text) = indent_args("indent", &args)?;
        Ok(Value::from(indent_text(spaces, &text)))
    });
    env.add_function(mangle("nindent"), |args: Rest<Value>| -> Result<Value, Error> {
        let (spaces, text) = indent_args("nindent", &args)?;
        Ok(Value::from(format!("\n{}", indent_text(spaces, &text))))
    });
}

fn register_config_functions(env: &mut Environment<'_>, options: Arc<IndexMap<String, String>>) {
    let opts = Arc::clone(&options);
    env.add_function(mangle("ConfigOption"), move |args: Rest<Value>| -> Result<Value, Error> {
        expect_args("ConfigOption", &args, 1)?;
        let value = opts.get(&go_string(&args[0])).cloned().unwrap_or_default();
        Ok(Value::from(value))
    });

    let opts = Arc::clone(&options);
    env.add_function(mangle("ConfigOptionEquals"), move |args: Rest<Value>| -> Result<Value, Error> {
        expect_args("ConfigOptionEquals", &args, 2)?;
        let equals = opts
            .get(&go_string(&args[0]))
            .is_some_and(|v| *v == go_string(&args[1]));
        Ok(Value::from(equals))
    });

    let opts = Arc::clone(&options);
    env.add_function(mangle("ConfigOptionNotEquals"), move |args: Rest<Value>| -> Result<Value, Error> {
        expect_args("ConfigOptionNotEquals", &args, 2)?;
        let not_equals = opts
            .get(&go_string(&args[0]))
            .is_some_and(|v| *v != go_string(&args[1]));
        Ok(Value::from(not_equals))
    });

    let opts = options;
    env.add_function(mangle("ConfigOptionData"), move |args: Rest<Value>| -> Result<Value, Error> {
        expect_args("ConfigOptionData", &args, 1)?;
        let value = opts.get(&go_string(&args[0])).cloned().unwrap_or_default();
        let bytes = BASE64
            .decode(value.trim())
            .map_err(|e| call_error("ConfigOptionData", e))?;
        Ok(Value::from(String::from_utf8_lossy(&bytes).into_owned()))
    });

    env.add_function(mangle("ConfigOptionFilename"), |args: Rest<Value>| -> Result<Value, Error> {
        expect_args("ConfigOptionFilename", &args, 1)?;
        Ok(Value::from(""))
    });
    env.add_function(mangle("ConfigOptionName"), |args: Rest<Value>| -> Result<Value, Error> {
        expect_args("ConfigOptionName", &args, 1)?;
        Ok(Value::from(go_string(&args[0])))
    });
}
