//! Token types for the fragment language lexer.

use shaderweave_core::Span;
use std::fmt;

/// A token from the source code.
///
/// The `'ast` lifetime refers to the arena where the lexeme string is allocated,
/// so the source string may be dropped once lexing is done.
#[derive(Clone, Copy, PartialEq)]
pub struct Token<'ast> {
    /// The type of token.
    pub kind: TokenKind,
    /// The source text of this token (allocated in arena).
    pub lexeme: &'ast str,
    /// Location in source.
    pub span: Span,
}

impl<'ast> Token<'ast> {
    /// Create a new token.
    #[inline]
    pub fn new(kind: TokenKind, lexeme: &'ast str, span: Span) -> Self {
        Self { kind, lexeme, span }
    }

    /// Whether this token is an identifier with the given text.
    #[inline]
    pub fn is_ident(&self, text: &str) -> bool {
        self.kind == TokenKind::Identifier && self.lexeme == text
    }
}

impl fmt::Debug for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:?} @ {:?})", self.kind, self.lexeme, self.span)
    }
}

/// All token types in the fragment language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // =========================================
    // Literals
    // =========================================
    /// Integer literal: `42`
    IntLiteral,
    /// Hex integer literal: `0xFF`
    HexLiteral,
    /// Real literal: `1.0`, `2.5e3`, `1.0f`
    RealLiteral,
    /// String literal: `"text"`
    StringLiteral,

    /// User-defined identifier
    Identifier,

    // =========================================
    // Keywords
    // =========================================
    /// `struct`
    Struct,
    /// `class`
    Class,
    /// `var`
    Var,
    /// `function`
    Function,
    /// `constructor`
    Constructor,
    /// `return`
    Return,
    /// `if`
    If,
    /// `else`
    Else,
    /// `while`
    While,
    /// `do`
    Do,
    /// `for`
    For,
    /// `foreach`
    Foreach,
    /// `in`
    In,
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `true`
    True,
    /// `false`
    False,
    /// `this`
    This,
    /// `ref`
    Ref,

    // =========================================
    // Punctuation
    // =========================================
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `[`
    LeftBracket,
    /// `]`
    RightBracket,
    /// `{`
    LeftBrace,
    /// `}`
    RightBrace,
    /// `;`
    Semicolon,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `.`
    Dot,
    /// `->`
    Arrow,
    /// `~>`
    TildeArrow,

    // =========================================
    // Operators
    // =========================================
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `++`
    PlusPlus,
    /// `--`
    MinusMinus,
    /// `=`
    Equal,
    /// `+=`
    PlusEqual,
    /// `-=`
    MinusEqual,
    /// `*=`
    StarEqual,
    /// `/=`
    SlashEqual,
    /// `%=`
    PercentEqual,
    /// `&=`
    AmpEqual,
    /// `|=`
    PipeEqual,
    /// `^=`
    CaretEqual,
    /// `<<=`
    LessLessEqual,
    /// `>>=`
    GreaterGreaterEqual,
    /// `==`
    EqualEqual,
    /// `!=`
    BangEqual,
    /// `<`
    Less,
    /// `<=`
    LessEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterEqual,
    /// `<<`
    LessLess,
    /// `>>`
    GreaterGreater,
    /// `&`
    Amp,
    /// `|`
    Pipe,
    /// `^`
    Caret,
    /// `&&`
    AmpAmp,
    /// `||`
    PipePipe,
    /// `!`
    Bang,
    /// `~`
    Tilde,

    // =========================================
    // Special
    // =========================================
    /// End of input.
    Eof,
    /// A lexing error; the error itself is recorded by the lexer.
    Error,
}

impl TokenKind {
    /// Whether this is a reserved keyword.
    pub fn is_keyword(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Struct
                | Class
                | Var
                | Function
                | Constructor
                | Return
                | If
                | Else
                | While
                | Do
                | For
                | Foreach
                | In
                | Break
                | Continue
                | True
                | False
                | This
                | Ref
        )
    }

    /// Whether this is a literal.
    pub fn is_literal(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            IntLiteral | HexLiteral | RealLiteral | StringLiteral | True | False
        )
    }

    /// Whether this is an assignment operator (simple or compound).
    pub fn is_assignment(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Equal
                | PlusEqual
                | MinusEqual
                | StarEqual
                | SlashEqual
                | PercentEqual
                | AmpEqual
                | PipeEqual
                | CaretEqual
                | LessLessEqual
                | GreaterGreaterEqual
        )
    }

    /// Human readable description, used in error messages.
    pub fn description(self) -> &'static str {
        use TokenKind::*;
        match self {
            IntLiteral => "integer literal",
            HexLiteral => "hex literal",
            RealLiteral => "real literal",
            StringLiteral => "string literal",
            Identifier => "identifier",
            Struct => "'struct'",
            Class => "'class'",
            Var => "'var'",
            Function => "'function'",
            Constructor => "'constructor'",
            Return => "'return'",
            If => "'if'",
            Else => "'else'",
            While => "'while'",
            Do => "'do'",
            For => "'for'",
            Foreach => "'foreach'",
            In => "'in'",
            Break => "'break'",
            Continue => "'continue'",
            True => "'true'",
            False => "'false'",
            This => "'this'",
            Ref => "'ref'",
            LeftParen => "'('",
            RightParen => "')'",
            LeftBracket => "'['",
            RightBracket => "']'",
            LeftBrace => "'{'",
            RightBrace => "'}'",
            Semicolon => "';'",
            Comma => "','",
            Colon => "':'",
            Dot => "'.'",
            Arrow => "'->'",
            TildeArrow => "'~>'",
            Plus => "'+'",
            Minus => "'-'",
            Star => "'*'",
            Slash => "'/'",
            Percent => "'%'",
            PlusPlus => "'++'",
            MinusMinus => "'--'",
            Equal => "'='",
            PlusEqual => "'+='",
            MinusEqual => "'-='",
            StarEqual => "'*='",
            SlashEqual => "'/='",
            PercentEqual => "'%='",
            AmpEqual => "'&='",
            PipeEqual => "'|='",
            CaretEqual => "'^='",
            LessLessEqual => "'<<='",
            GreaterGreaterEqual => "'>>='",
            EqualEqual => "'=='",
            BangEqual => "'!='",
            Less => "'<'",
            LessEqual => "'<='",
            Greater => "'>'",
            GreaterEqual => "'>='",
            LessLess => "'<<'",
            GreaterGreater => "'>>'",
            Amp => "'&'",
            Pipe => "'|'",
            Caret => "'^'",
            AmpAmp => "'&&'",
            PipePipe => "'||'",
            Bang => "'!'",
            Tilde => "'~'",
            Eof => "end of file",
            Error => "invalid token",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Look up a keyword by its text.
pub fn lookup_keyword(ident: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match ident {
        "struct" => Struct,
        "class" => Class,
        "var" => Var,
        "function" => Function,
        "constructor" => Constructor,
        "return" => Return,
        "if" => If,
        "else" => Else,
        "while" => While,
        "do" => Do,
        "for" => For,
        "foreach" => Foreach,
        "in" => In,
        "break" => Break,
        "continue" => Continue,
        "true" => True,
        "false" => False,
        "this" => This,
        "ref" => Ref,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_round_trip() {
        assert_eq!(lookup_keyword("struct"), Some(TokenKind::Struct));
        assert_eq!(lookup_keyword("foreach"), Some(TokenKind::Foreach));
        assert_eq!(lookup_keyword("Struct"), None);
        assert!(TokenKind::Ref.is_keyword());
        assert!(!TokenKind::Identifier.is_keyword());
    }

    #[test]
    fn assignment_classification() {
        assert!(TokenKind::Equal.is_assignment());
        assert!(TokenKind::LessLessEqual.is_assignment());
        assert!(!TokenKind::EqualEqual.is_assignment());
    }
}
