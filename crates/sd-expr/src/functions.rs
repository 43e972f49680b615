//! The fixed set of math functions formulas may call.

use crate::error::EvalError;

/// Module prefixes accepted in front of a function or constant, e.g. `np.exp(x)`.
pub const NAMESPACES: [&str; 3] = ["math", "np", "numpy"];

/// An allow-listed function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Max,
    Min,
    Abs,
    Exp,
    Log,
    Log10,
    Log2,
    Sqrt,
    Pow,
    Floor,
    Ceil,
    Round,
    Sin,
    Cos,
    Tan,
    Tanh,
    Atan,
    Clip,
    Where,
    Float,
    Int,
}

/// Accepted argument counts; `max: None` means variadic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    const fn exactly(n: usize) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    pub fn accepts(self, n: usize) -> bool {
        n >= self.min && self.max.map_or(true, |max| n <= max)
    }
}

impl Function {
    /// Resolve a function name. `maximum` / `minimum` are the numpy spellings of `max` / `min`.
    pub fn lookup(name: &str) -> Option<Self> {
        let f = match name {
            "max" | "maximum" => Function::Max,
            "min" | "minimum" => Function::Min,
            "abs" => Function::Abs,
            "exp" => Function::Exp,
            "log" => Function::Log,
            "log10" => Function::Log10,
            "log2" => Function::Log2,
            "sqrt" => Function::Sqrt,
            "pow" => Function::Pow,
            "floor" => Function::Floor,
            "ceil" => Function::Ceil,
            "round" => Function::Round,
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "tanh" => Function::Tanh,
            "atan" => Function::Atan,
            "clip" => Function::Clip,
            "where" => Function::Where,
            "float" => Function::Float,
            "int" => Function::Int,
            _ => return None,
        };
        Some(f)
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Max => "max",
            Function::Min => "min",
            Function::Abs => "abs",
            Function::Exp => "exp",
            Function::Log => "log",
            Function::Log10 => "log10",
            Function::Log2 => "log2",
            Function::Sqrt => "sqrt",
            Function::Pow => "pow",
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::Round => "round",
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Tanh => "tanh",
            Function::Atan => "atan",
            Function::Clip => "clip",
            Function::Where => "where",
            Function::Float => "float",
            Function::Int => "int",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            Function::Max | Function::Min => Arity { min: 2, max: None },
            Function::Log | Function::Round => Arity {
                min: 1,
                max: Some(2),
            },
            Function::Pow => Arity::exactly(2),
            Function::Clip | Function::Where => Arity::exactly(3),
            _ => Arity::exactly(1),
        }
    }

    /// Apply to already-evaluated arguments.
    pub fn apply(self, args: &[f64]) -> Result<f64, EvalError> {
        if !self.arity().accepts(args.len()) {
            return Err(EvalError::ArgumentCount {
                function: self.name(),
                given: args.len(),
            });
        }
        let x = args[0];
        let value = match self {
            Function::Max => args[1..]
                .iter()
                .fold(x, |acc, &v| if v > acc { v } else { acc }),
            Function::Min => args[1..]
                .iter()
                .fold(x, |acc, &v| if v < acc { v } else { acc }),
            Function::Abs => x.abs(),
            Function::Exp => self.checked(x, x.exp())?,
            Function::Log => {
                if x <= 0.0 {
                    return Err(self.domain(x));
                }
                match args.get(1) {
                    Some(&base) if base <= 0.0 => return Err(self.domain(base)),
                    Some(&base) if base == 1.0 => return Err(EvalError::DivisionByZero),
                    Some(&base) => x.ln() / base.ln(),
                    None => x.ln(),
                }
            }
            Function::Log10 | Function::Log2 => {
                if x <= 0.0 {
                    return Err(self.domain(x));
                }
                if self == Function::Log10 {
                    x.log10()
                } else {
                    x.log2()
                }
            }
            Function::Sqrt => {
                if x < 0.0 {
                    return Err(self.domain(x));
                }
                x.sqrt()
            }
            Function::Pow => power(x, args[1], "pow")?,
            Function::Floor => x.floor(),
            Function::Ceil => x.ceil(),
            Function::Round => match args.get(1) {
                Some(&digits) => {
                    let scale = 10f64.powi(digits.trunc() as i32);
                    round_half_even(x * scale) / scale
                }
                None => round_half_even(x),
            },
            Function::Sin => x.sin(),
            Function::Cos => x.cos(),
            Function::Tan => self.checked(x, x.tan())?,
            Function::Tanh => x.tanh(),
            Function::Atan => x.atan(),
            Function::Clip => x.max(args[1]).min(args[2]),
            Function::Where => {
                if x != 0.0 {
                    args[1]
                } else {
                    args[2]
                }
            }
            Function::Float => x,
            Function::Int => x.trunc(),
        };
        Ok(value)
    }

    fn domain(self, argument: f64) -> EvalError {
        EvalError::Domain {
            function: self.name(),
            argument,
        }
    }

    fn checked(self, argument: f64, result: f64) -> Result<f64, EvalError> {
        if result.is_finite() {
            Ok(result)
        } else {
            Err(self.domain(argument))
        }
    }
}

/// `base ** exponent` restricted to real, finite results.
pub(crate) fn power(base: f64, exponent: f64, function: &'static str) -> Result<f64, EvalError> {
    if base == 0.0 && exponent < 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    let result = base.powf(exponent);
    if result.is_finite() {
        Ok(result)
    } else {
        Err(EvalError::Domain {
            function,
            argument: base,
        })
    }
}

/// Round to nearest, ties to even.
fn round_half_even(x: f64) -> f64 {
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        x.round()
    }
}

/// Named constants reachable through a namespace, e.g. `math.pi`.
pub fn namespace_constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        _ => None,
    }
}
