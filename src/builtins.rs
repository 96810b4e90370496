/// Functions a `Call` statement can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// Emits its argument as one output line.
    Print,
    /// Emits one line per visible variable with its type and values.
    Debug,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "print" => Some(Self::Print),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Print => "print",
            Self::Debug => "debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_names_only() {
        assert_eq!(Builtin::from_name("print"), Some(Builtin::Print));
        assert_eq!(Builtin::from_name("debug").map(Builtin::name), Some("debug"));
        assert_eq!(Builtin::from_name("len"), None);
    }
}
