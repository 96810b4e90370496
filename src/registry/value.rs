use std::fmt;

use super::{PRIM_BOOL, PRIM_INT, PRIM_REAL, PRIM_STRING};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Real(f64),
    Str(String),
}

impl Value {
    /// Zero value stored in fresh slots of a variable of `type_name`.
    pub fn default_for(type_name: &str) -> Self {
        match type_name {
            PRIM_REAL => Value::Real(0.0),
            PRIM_STRING => Value::Str(String::new()),
            _ => Value::Int(0),
        }
    }

    /// Primitive type the value naturally belongs to.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => PRIM_INT,
            Value::Real(_) => PRIM_REAL,
            Value::Str(_) => PRIM_STRING,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Real(value) => Some(*value),
            Value::Str(_) => None,
        }
    }

    /// Reads the value as a number. Text parses as an integer or a real,
    /// else as its leading digits, else as zero.
    pub fn to_number(&self) -> Value {
        let Value::Str(text) = self else {
            return self.clone();
        };
        let text = text.trim();
        if let Ok(value) = text.parse::<i64>() {
            return Value::Int(value);
        }
        if let Some(value) = text.parse::<f64>().ok().filter(|value| value.is_finite()) {
            return Value::Real(value);
        }
        let digits = text
            .char_indices()
            .take_while(|&(at, c)| c.is_ascii_digit() || (at == 0 && matches!(c, '-' | '+')))
            .count();
        Value::Int(text[..digits].parse().unwrap_or(0))
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Value::Int(value) => usize::try_from(*value).ok(),
            _ => None,
        }
    }

    /// Converts to `type_name` when it is a primitive; other types keep the
    /// value as it is. `None` when the text cannot be read as a number.
    pub fn convert_to(&self, type_name: &str) -> Option<Value> {
        match (type_name, self) {
            (PRIM_INT, Value::Int(_)) => Some(self.clone()),
            (PRIM_INT, Value::Real(value)) => Some(Value::Int(value.trunc() as i64)),
            (PRIM_INT, Value::Str(text)) => {
                let text = text.trim();
                text.parse::<i64>()
                    .ok()
                    .or_else(|| text.parse::<f64>().ok().map(|value| value.trunc() as i64))
                    .map(Value::Int)
            }
            (PRIM_REAL, Value::Int(value)) => Some(Value::Real(*value as f64)),
            (PRIM_REAL, Value::Real(_)) => Some(self.clone()),
            (PRIM_REAL, Value::Str(text)) => text.trim().parse::<f64>().ok().map(Value::Real),
            (PRIM_STRING, Value::Str(_)) => Some(self.clone()),
            (PRIM_STRING, _) => Some(Value::Str(self.to_string())),
            (PRIM_BOOL, Value::Int(value)) => Some(Value::Int(i64::from(*value != 0))),
            (PRIM_BOOL, Value::Real(value)) => Some(Value::Int(i64::from(*value != 0.0))),
            (PRIM_BOOL, Value::Str(text)) => Some(Value::Int(i64::from(!text.is_empty()))),
            _ => Some(self.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{value}"),
            Value::Real(value) if value.is_finite() && value.fract() == 0.0 => {
                write!(f, "{value:.1}")
            }
            Value::Real(value) => write!(f, "{value}"),
            Value::Str(value) => write!(f, "{value}"),
        }
    }
}
