//! Operator definitions for fragment expressions.
//!
//! Provides enums for binary, unary, postfix and assignment operators along
//! with precedence and associativity information. The same precedence
//! levels drive both the Pratt parser and the grouping decisions made when
//! translating expressions back into text.

use crate::lexer::TokenKind;
use std::fmt;

/// Associativity of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Associativity {
    /// `a - b - c` is `(a - b) - c`.
    Left,
    /// `a = b = c` is `a = (b = c)`.
    Right,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `||`
    LogicalOr,
    /// `&&`
    LogicalAnd,
    /// `|`
    BitwiseOr,
    /// `^`
    BitwiseXor,
    /// `&`
    BitwiseAnd,
    /// `==`
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `<<`
    ShiftLeft,
    /// `>>`
    ShiftRight,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
}

impl BinaryOp {
    /// Precedence level; lower numbers bind tighter.
    pub fn precedence(&self) -> u8 {
        use BinaryOp::*;
        match self {
            Mul | Div | Mod => 3,
            Add | Sub => 4,
            ShiftLeft | ShiftRight => 5,
            Less | LessEqual | Greater | GreaterEqual => 6,
            Equal | NotEqual => 7,
            BitwiseAnd => 8,
            BitwiseXor => 9,
            BitwiseOr => 10,
            LogicalAnd => 11,
            LogicalOr => 12,
        }
    }

    /// All binary operators are left-associative.
    pub fn associativity(&self) -> Associativity {
        Associativity::Left
    }

    /// Get the binding power for the Pratt parser.
    ///
    /// Higher values bind more tightly. Returns (left_bp, right_bp); for
    /// left-associative operators right_bp = left_bp + 1.
    pub fn binding_power(&self) -> (u8, u8) {
        let left = 30 - 2 * self.precedence();
        (left, left + 1)
    }

    /// Try to convert a token kind to a binary operator.
    pub fn from_token(token: TokenKind) -> Option<Self> {
        use TokenKind::*;
        Some(match token {
            PipePipe => BinaryOp::LogicalOr,
            AmpAmp => BinaryOp::LogicalAnd,
            Pipe => BinaryOp::BitwiseOr,
            Caret => BinaryOp::BitwiseXor,
            Amp => BinaryOp::BitwiseAnd,
            EqualEqual => BinaryOp::Equal,
            BangEqual => BinaryOp::NotEqual,
            Less => BinaryOp::Less,
            LessEqual => BinaryOp::LessEqual,
            Greater => BinaryOp::Greater,
            GreaterEqual => BinaryOp::GreaterEqual,
            LessLess => BinaryOp::ShiftLeft,
            GreaterGreater => BinaryOp::ShiftRight,
            Plus => BinaryOp::Add,
            Minus => BinaryOp::Sub,
            Star => BinaryOp::Mul,
            Slash => BinaryOp::Div,
            Percent => BinaryOp::Mod,
            _ => return None,
        })
    }

    /// Check if this operator produces a boolean by comparing its operands.
    pub fn is_comparison(&self) -> bool {
        use BinaryOp::*;
        matches!(
            self,
            Equal | NotEqual | Less | LessEqual | Greater | GreaterEqual
        )
    }

    /// Check if this is a short-circuiting logical operator.
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::LogicalAnd | BinaryOp::LogicalOr)
    }

    /// Source text of the operator.
    pub fn as_str(&self) -> &'static str {
        use BinaryOp::*;
        match self {
            LogicalOr => "||",
            LogicalAnd => "&&",
            BitwiseOr => "|",
            BitwiseXor => "^",
            BitwiseAnd => "&",
            Equal => "==",
            NotEqual => "!=",
            Less => "<",
            LessEqual => "<=",
            Greater => ">",
            GreaterEqual => ">=",
            ShiftLeft => "<<",
            ShiftRight => ">>",
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Mod => "%",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prefix unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `+x`
    Plus,
    /// `!x`
    LogicalNot,
    /// `~x`
    BitwiseNot,
    /// `++x`
    PreInc,
    /// `--x`
    PreDec,
}

impl UnaryOp {
    /// Precedence level of every prefix operator.
    pub const PRECEDENCE: u8 = 2;

    /// Binding power for the operand of a prefix operator.
    pub fn binding_power(&self) -> u8 {
        27
    }

    /// Try to convert a token kind to a unary operator.
    pub fn from_token(token: TokenKind) -> Option<Self> {
        use TokenKind::*;
        Some(match token {
            Minus => UnaryOp::Neg,
            Plus => UnaryOp::Plus,
            Bang => UnaryOp::LogicalNot,
            Tilde => UnaryOp::BitwiseNot,
            PlusPlus => UnaryOp::PreInc,
            MinusMinus => UnaryOp::PreDec,
            _ => return None,
        })
    }

    /// Whether the operator writes back to its operand.
    pub fn is_mutating(&self) -> bool {
        matches!(self, UnaryOp::PreInc | UnaryOp::PreDec)
    }

    /// Source text of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::LogicalNot => "!",
            UnaryOp::BitwiseNot => "~",
            UnaryOp::PreInc => "++",
            UnaryOp::PreDec => "--",
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Postfix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostfixOp {
    /// `x++`
    PostInc,
    /// `x--`
    PostDec,
}

impl PostfixOp {
    /// Precedence level shared by postfix, call, index and member access.
    pub const PRECEDENCE: u8 = 1;

    /// Binding power of postfix operators.
    pub const BINDING_POWER: u8 = 29;

    /// Try to convert a token kind to a postfix operator.
    pub fn from_token(token: TokenKind) -> Option<Self> {
        match token {
            TokenKind::PlusPlus => Some(PostfixOp::PostInc),
            TokenKind::MinusMinus => Some(PostfixOp::PostDec),
            _ => None,
        }
    }

    /// Source text of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            PostfixOp::PostInc => "++",
            PostfixOp::PostDec => "--",
        }
    }
}

/// Assignment operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `+=`
    AddAssign,
    /// `-=`
    SubAssign,
    /// `*=`
    MulAssign,
    /// `/=`
    DivAssign,
    /// `%=`
    ModAssign,
    /// `&=`
    AndAssign,
    /// `|=`
    OrAssign,
    /// `^=`
    XorAssign,
    /// `<<=`
    ShlAssign,
    /// `>>=`
    ShrAssign,
}

impl AssignOp {
    /// Precedence level of every assignment operator.
    pub const PRECEDENCE: u8 = 14;

    /// Assignment is right-associative with the lowest binding power.
    pub fn binding_power(&self) -> (u8, u8) {
        (2, 1)
    }

    /// Try to convert a token kind to an assignment operator.
    pub fn from_token(token: TokenKind) -> Option<Self> {
        use TokenKind::*;
        Some(match token {
            Equal => AssignOp::Assign,
            PlusEqual => AssignOp::AddAssign,
            MinusEqual => AssignOp::SubAssign,
            StarEqual => AssignOp::MulAssign,
            SlashEqual => AssignOp::DivAssign,
            PercentEqual => AssignOp::ModAssign,
            AmpEqual => AssignOp::AndAssign,
            PipeEqual => AssignOp::OrAssign,
            CaretEqual => AssignOp::XorAssign,
            LessLessEqual => AssignOp::ShlAssign,
            GreaterGreaterEqual => AssignOp::ShrAssign,
            _ => return None,
        })
    }

    /// The binary operator a compound assignment applies, `None` for `=`.
    pub fn binary_op(&self) -> Option<BinaryOp> {
        use AssignOp::*;
        Some(match self {
            Assign => return None,
            AddAssign => BinaryOp::Add,
            SubAssign => BinaryOp::Sub,
            MulAssign => BinaryOp::Mul,
            DivAssign => BinaryOp::Div,
            ModAssign => BinaryOp::Mod,
            AndAssign => BinaryOp::BitwiseAnd,
            OrAssign => BinaryOp::BitwiseOr,
            XorAssign => BinaryOp::BitwiseXor,
            ShlAssign => BinaryOp::ShiftLeft,
            ShrAssign => BinaryOp::ShiftRight,
        })
    }

    /// Whether this is a compound assignment.
    pub fn is_compound(&self) -> bool {
        !matches!(self, AssignOp::Assign)
    }

    /// Source text of the operator.
    pub fn as_str(&self) -> &'static str {
        use AssignOp::*;
        match self {
            Assign => "=",
            AddAssign => "+=",
            SubAssign => "-=",
            MulAssign => "*=",
            DivAssign => "/=",
            ModAssign => "%=",
            AndAssign => "&=",
            OrAssign => "|=",
            XorAssign => "^=",
            ShlAssign => "<<=",
            ShrAssign => ">>=",
        }
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_power_follows_precedence() {
        let (mul, _) = BinaryOp::Mul.binding_power();
        let (add, _) = BinaryOp::Add.binding_power();
        let (or, _) = BinaryOp::LogicalOr.binding_power();
        assert!(mul > add);
        assert!(add > or);
        assert!(or > AssignOp::Assign.binding_power().0);
        assert!(UnaryOp::Neg.binding_power() > mul);
        assert!(PostfixOp::BINDING_POWER > UnaryOp::Neg.binding_power());
    }

    #[test]
    fn compound_assignment_ops() {
        assert_eq!(AssignOp::SubAssign.binary_op(), Some(BinaryOp::Sub));
        assert_eq!(AssignOp::Assign.binary_op(), None);
        assert!(AssignOp::ShlAssign.is_compound());
    }

    #[test]
    fn token_conversion() {
        assert_eq!(BinaryOp::from_token(TokenKind::AmpAmp), Some(BinaryOp::LogicalAnd));
        assert_eq!(UnaryOp::from_token(TokenKind::Bang), Some(UnaryOp::LogicalNot));
        assert_eq!(AssignOp::from_token(TokenKind::PercentEqual), Some(AssignOp::ModAssign));
        assert_eq!(BinaryOp::from_token(TokenKind::Equal), None);
    }
}
