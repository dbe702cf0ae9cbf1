//! Scalar and index expressions.
//!
//! Expressions are small owned trees hanging off statement nodes: loop bounds,
//! buffer subscripts, stored values and branch conditions. They are not part
//! of the node arena and carry no identifiers.

use serde::{Serialize, Deserialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops::{Add, Sub, Mul, Neg};
use std::str::FromStr;

/// Element type of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
}

impl DataType {
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64)
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
            DataType::Bool => "bool",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int32" | "i32" => Ok(DataType::Int32),
            "int64" | "i64" => Ok(DataType::Int64),
            "float32" | "f32" => Ok(DataType::Float32),
            "float64" | "f64" => Ok(DataType::Float64),
            "bool" => Ok(DataType::Bool),
            _ => Err(format!("unknown data type `{}`", s)),
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add, Sub, Mul, Div, FloorDiv, CeilDiv, Mod,
    Min, Max,
    Lt, Le, Gt, Ge, Eq, Ne,
    And, Or,
}

impl BinaryOp {
    /// Infix symbol, or the function name for operators printed as calls.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "floordiv",
            BinaryOp::CeilDiv => "ceildiv",
            BinaryOp::Mod => "%",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    fn is_call_like(&self) -> bool {
        matches!(
            self,
            BinaryOp::FloorDiv | BinaryOp::CeilDiv | BinaryOp::Min | BinaryOp::Max
        )
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// An expression tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Integer constant
    Int(i64),
    /// Floating point constant
    Float(f64),
    /// Boolean constant
    Bool(bool),
    /// Scalar variable: a loop iterator or a symbolic parameter
    Var(String),
    /// Element read from a buffer
    Load { var: String, indices: Vec<Expr> },
    /// Unary operation
    Unary { op: UnaryOp, operand: Box<Expr> },
    /// Binary operation
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::Int(value)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn load(var: impl Into<String>, indices: Vec<Expr>) -> Self {
        Expr::Load { var: var.into(), indices }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary { op, operand: Box::new(operand) }
    }

    /// The value of an integer constant.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Expr::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_var(&self, name: &str) -> bool {
        matches!(self, Expr::Var(v) if v == name)
    }

    /// Visit every sub-expression in pre-order.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Load { indices, .. } => {
                for idx in indices {
                    idx.visit(f);
                }
            }
            Expr::Unary { operand, .. } => operand.visit(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit(f);
                rhs.visit(f);
            }
            Expr::Int(_) | Expr::Float(_) | Expr::Bool(_) | Expr::Var(_) => {}
        }
    }

    /// Rebuild the expression top-down. Where `f` returns a replacement the
    /// replacement is used as-is and its children are not revisited.
    pub fn rewrite(&self, f: &mut impl FnMut(&Expr) -> Option<Expr>) -> Expr {
        if let Some(replaced) = f(self) {
            return replaced;
        }
        match self {
            Expr::Load { var, indices } => Expr::Load {
                var: var.clone(),
                indices: indices.iter().map(|i| i.rewrite(f)).collect(),
            },
            Expr::Unary { op, operand } => Expr::unary(*op, operand.rewrite(f)),
            Expr::Binary { op, lhs, rhs } => Expr::binary(*op, lhs.rewrite(f), rhs.rewrite(f)),
            other => other.clone(),
        }
    }

    /// Names of scalar variables used by this expression.
    pub fn free_vars(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        self.visit(&mut |e| {
            if let Expr::Var(name) = e {
                vars.insert(name.clone());
            }
        });
        vars
    }

    /// Names of buffers read by this expression.
    pub fn buffers_read(&self) -> BTreeSet<String> {
        let mut bufs = BTreeSet::new();
        self.visit(&mut |e| {
            if let Expr::Load { var, .. } = e {
                bufs.insert(var.clone());
            }
        });
        bufs
    }

    pub fn mentions_var(&self, name: &str) -> bool {
        let mut found = false;
        self.visit(&mut |e| found |= e.is_var(name));
        found
    }

    pub fn reads_buffer(&self, name: &str) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if let Expr::Load { var, .. } = e {
                found |= var == name;
            }
        });
        found
    }

    /// Replace scalar variables according to `map`.
    pub fn substitute(&self, map: &HashMap<String, Expr>) -> Expr {
        self.rewrite(&mut |e| match e {
            Expr::Var(name) => map.get(name).cloned(),
            _ => None,
        })
    }

    /// Rename scalar variables and buffers in one pass.
    pub fn rename(&self, vars: &HashMap<String, String>, buffers: &HashMap<String, String>) -> Expr {
        self.rewrite(&mut |e| match e {
            Expr::Var(name) => vars.get(name).map(|n| Expr::Var(n.clone())),
            Expr::Load { var, indices } => buffers.get(var).map(|n| Expr::Load {
                var: n.clone(),
                indices: indices.iter().map(|i| i.rename(vars, buffers)).collect(),
            }),
            _ => None,
        })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(v) => write!(f, "{}", v),
            Expr::Float(v) => write!(f, "{:?}", v),
            Expr::Bool(v) => write!(f, "{}", v),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Load { var, indices } => {
                write!(f, "{}[", var)?;
                for (i, idx) in indices.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", idx)?;
                }
                write!(f, "]")
            }
            Expr::Unary { op: UnaryOp::Neg, operand } => write!(f, "-{}", operand),
            Expr::Unary { op: UnaryOp::Not, operand } => write!(f, "!{}", operand),
            Expr::Binary { op, lhs, rhs } if op.is_call_like() => {
                write!(f, "{}({}, {})", op.symbol(), lhs, rhs)
            }
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
        }
    }
}

impl From<i64> for Expr {
    fn from(v: i64) -> Self { Expr::Int(v) }
}

impl From<i32> for Expr {
    fn from(v: i32) -> Self { Expr::Int(v as i64) }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self { Expr::Float(v) }
}

impl From<bool> for Expr {
    fn from(v: bool) -> Self { Expr::Bool(v) }
}

impl Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr { Expr::binary(BinaryOp::Add, self, rhs) }
}

impl Add<i64> for Expr {
    type Output = Expr;
    fn add(self, rhs: i64) -> Expr { Expr::binary(BinaryOp::Add, self, Expr::Int(rhs)) }
}

impl Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr { Expr::binary(BinaryOp::Sub, self, rhs) }
}

impl Sub<i64> for Expr {
    type Output = Expr;
    fn sub(self, rhs: i64) -> Expr { Expr::binary(BinaryOp::Sub, self, Expr::Int(rhs)) }
}

impl Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr { Expr::binary(BinaryOp::Mul, self, rhs) }
}

impl Mul<i64> for Expr {
    type Output = Expr;
    fn mul(self, rhs: i64) -> Expr { Expr::binary(BinaryOp::Mul, self, Expr::Int(rhs)) }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr { Expr::unary(UnaryOp::Neg, self) }
}

// Free-standing constructors, so tests and builders read like the kernels
// they describe.

pub fn int(v: i64) -> Expr { Expr::Int(v) }
pub fn float(v: f64) -> Expr { Expr::Float(v) }
pub fn var(name: &str) -> Expr { Expr::var(name) }
pub fn load(buffer: &str, indices: Vec<Expr>) -> Expr { Expr::load(buffer, indices) }
pub fn min(a: Expr, b: Expr) -> Expr { Expr::binary(BinaryOp::Min, a, b) }
pub fn max(a: Expr, b: Expr) -> Expr { Expr::binary(BinaryOp::Max, a, b) }
pub fn div(a: Expr, b: Expr) -> Expr { Expr::binary(BinaryOp::Div, a, b) }
pub fn floor_div(a: Expr, b: Expr) -> Expr { Expr::binary(BinaryOp::FloorDiv, a, b) }
pub fn ceil_div(a: Expr, b: Expr) -> Expr { Expr::binary(BinaryOp::CeilDiv, a, b) }
pub fn modulo(a: Expr, b: Expr) -> Expr { Expr::binary(BinaryOp::Mod, a, b) }
pub fn lt(a: Expr, b: Expr) -> Expr { Expr::binary(BinaryOp::Lt, a, b) }
pub fn le(a: Expr, b: Expr) -> Expr { Expr::binary(BinaryOp::Le, a, b) }
pub fn gt(a: Expr, b: Expr) -> Expr { Expr::binary(BinaryOp::Gt, a, b) }
pub fn ge(a: Expr, b: Expr) -> Expr { Expr::binary(BinaryOp::Ge, a, b) }
pub fn eq(a: Expr, b: Expr) -> Expr { Expr::binary(BinaryOp::Eq, a, b) }
pub fn ne(a: Expr, b: Expr) -> Expr { Expr::binary(BinaryOp::Ne, a, b) }
pub fn and(a: Expr, b: Expr) -> Expr { Expr::binary(BinaryOp::And, a, b) }
pub fn or(a: Expr, b: Expr) -> Expr { Expr::binary(BinaryOp::Or, a, b) }
pub fn not(a: Expr) -> Expr { Expr::unary(UnaryOp::Not, a) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = load("y", vec![var("i"), var("j") + 1]) * int(2);
        assert_eq!(e.to_string(), "(y[i, (j + 1)] * 2)");
        assert_eq!(min(var("a"), int(3)).to_string(), "min(a, 3)");
        assert_eq!(float(2.0).to_string(), "2.0");
    }

    #[test]
    fn test_free_vars_and_buffers() {
        let e = load("x", vec![var("i")]) + var("n") * var("i");
        let vars: Vec<_> = e.free_vars().into_iter().collect();
        assert_eq!(vars, vec!["i".to_string(), "n".to_string()]);
        assert!(e.reads_buffer("x"));
        assert!(!e.reads_buffer("y"));
        assert!(e.mentions_var("n"));
    }

    #[test]
    fn test_substitute() {
        let e = load("y", vec![var("i")]) + var("i");
        let mut map = HashMap::new();
        map.insert("i".to_string(), var("i.1") + int(4) * var("i.0"));
        let s = e.substitute(&map);
        assert_eq!(s.to_string(), "(y[(i.1 + (4 * i.0))] + (i.1 + (4 * i.0)))");
    }

    #[test]
    fn test_rename() {
        let e = load("y", vec![var("i")]);
        let vars = HashMap::from([("i".to_string(), "k".to_string())]);
        let bufs = HashMap::from([("y".to_string(), "z".to_string())]);
        assert_eq!(e.rename(&vars, &bufs), load("z", vec![var("k")]));
    }

    #[test]
    fn test_data_type_parse() {
        assert_eq!("float32".parse::<DataType>().unwrap(), DataType::Float32);
        assert!("complex".parse::<DataType>().is_err());
        assert!(DataType::Int64.is_int());
    }
}
