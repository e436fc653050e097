//! Statement translation.
//!
//! Statements are written straight into the function's code builder, one
//! mapping per statement. A statement that fails to translate records its
//! error and is skipped so the rest of the body still reports.

use shaderweave_core::CompileError;
use shaderweave_parser::ast::{Expr, ForStmt, Stmt, VarDeclStmt};

use crate::core_types::ShaderType;

use super::expr::ExprText;
use super::{FunctionTranslator, Result, local_name};

impl<'t, 'a> FunctionTranslator<'t, 'a> {
    /// Translate one statement, recording rather than returning errors.
    pub(crate) fn stmt(&mut self, stmt: &Stmt<'_>) {
        self.out.push_mapping(&self.origin, stmt.span());
        if let Err(error) = self.stmt_inner(stmt) {
            self.errors.push(error);
        }
        self.out.pop_mapping();
    }

    fn stmt_inner(&mut self, stmt: &Stmt<'_>) -> Result<()> {
        match stmt {
            Stmt::Expr(expr_stmt) => {
                let text = self.expr(expr_stmt.expr)?;
                self.emit_line("", Some(text), ";");
            }
            Stmt::VarDecl(decl) => {
                if let Some(text) = self.var_decl(decl)? {
                    self.emit_line("", Some(text), ";");
                }
            }
            Stmt::Return(ret) => match ret.value {
                Some(value) => {
                    let text = self.expr(value)?;
                    self.emit_line("return ", Some(text), ";");
                }
                None if self.in_constructor => {
                    self.out.line("return self;");
                }
                None => {
                    self.out.line("return;");
                }
            },
            Stmt::Break(_) => {
                self.out.line("break;");
            }
            Stmt::Continue(_) => {
                self.out.line("continue;");
            }
            Stmt::Block(block) => {
                self.out.begin_scope();
                self.scope.push();
                for stmt in block.stmts {
                    self.stmt(stmt);
                }
                self.scope.pop();
                self.out.end_scope();
            }
            Stmt::If(if_stmt) => {
                let condition = self.reported_condition(if_stmt.condition);
                self.emit_condition("if (", condition, ")");
                self.body(if_stmt.then_stmt);
                if let Some(else_stmt) = if_stmt.else_stmt {
                    self.out.line("else");
                    self.body(else_stmt);
                }
            }
            Stmt::While(while_stmt) => {
                let condition = self.reported_condition(while_stmt.condition);
                self.emit_condition("while (", condition, ")");
                self.body(while_stmt.body);
            }
            Stmt::DoWhile(do_while) => {
                let condition = self.reported_condition(do_while.condition);
                self.out.line("do");
                self.body(do_while.body);
                self.emit_condition("while (", condition, ");");
            }
            Stmt::For(for_stmt) => {
                self.scope.push();
                let result = self.for_loop(for_stmt);
                self.scope.pop();
                result?;
            }
            Stmt::Foreach(foreach) => {
                return Err(CompileError::Untranslatable {
                    construct: "foreach".into(),
                    span: foreach.span,
                });
            }
        }
        Ok(())
    }

    /// A loop or branch body, always braced.
    fn body(&mut self, stmt: &Stmt<'_>) {
        if matches!(stmt, Stmt::Block(_)) {
            self.stmt(stmt);
            return;
        }
        self.out.begin_scope();
        self.scope.push();
        self.stmt(stmt);
        self.scope.pop();
        self.out.end_scope();
    }

    fn condition(&mut self, condition: &Expr<'_>) -> Result<ExprText> {
        let ty = self.typer.type_of(condition, &self.scope)?;
        if ty != ShaderType::BOOLEAN {
            return Err(CompileError::TypeMismatch {
                message: format!("condition must be Boolean, found {ty}"),
                span: condition.span(),
            });
        }
        self.expr(condition)
    }

    /// A condition's text. A bad condition is recorded and `None` returned
    /// so the body is still walked.
    fn reported_condition(&mut self, condition: &Expr<'_>) -> Option<ExprText> {
        match self.condition(condition) {
            Ok(text) => Some(text),
            Err(error) => {
                self.errors.push(error);
                None
            }
        }
    }

    /// Like `emit_line`, writing `false` for a condition that failed.
    fn emit_condition(&mut self, prefix: &str, condition: Option<ExprText>, suffix: &str) {
        match condition {
            Some(text) => self.emit_line(prefix, Some(text), suffix),
            None => self.emit_line(&format!("{prefix}false"), None, suffix),
        }
    }

    /// Write an indented line made of `prefix`, a translated expression and
    /// `suffix`.
    fn emit_line(&mut self, prefix: &str, text: Option<ExprText>, suffix: &str) {
        self.out.write_indent().write(prefix);
        if let Some(text) = text {
            self.out.append_mapped(&text.text, &text.mappings);
        }
        self.out.write(suffix).write("\n");
    }

    /// Declaration text without the trailing semicolon. Output streams are
    /// only tracked: they have no storage of their own.
    fn var_decl(&mut self, decl: &VarDeclStmt<'_>) -> Result<Option<ExprText>> {
        let declared = decl.ty.as_ref().map(|ty| self.resolve(ty)).transpose()?;
        let init_ty = decl
            .init
            .map(|init| self.typer.type_of(init, &self.scope))
            .transpose()?;

        let ty = match (declared, init_ty) {
            (Some(declared), Some(init_ty)) => {
                if !init_ty.converts_to(&declared) {
                    return Err(CompileError::TypeMismatch {
                        message: format!("cannot initialize {declared} from {init_ty}"),
                        span: decl.span,
                    });
                }
                declared
            }
            (Some(declared), None) => declared,
            (None, Some(init_ty)) => init_ty,
            (None, None) => {
                return Err(CompileError::TypeMismatch {
                    message: format!("cannot infer the type of '{}'", decl.name.name),
                    span: decl.span,
                });
            }
        };
        if ty.is_void() {
            return Err(CompileError::TypeMismatch {
                message: format!("'{}' cannot be Void", decl.name.name),
                span: decl.span,
            });
        }

        let local = local_name(decl.name.name);
        if matches!(&ty, ShaderType::Stream(stream) if stream.is_output) {
            self.scope.declare(decl.name.name, ty, local);
            return Ok(None);
        }

        self.deps.use_type(&ty);
        let value = match decl.init {
            Some(init) => Some(self.expr(init)?),
            None => self.default_value(&ty).map(ExprText::atom),
        };
        let declaration = self.ctx.resolvers().declare(&ty, &local);
        // Declared after the initializer so `var x = x;` reads the outer `x`
        self.scope.declare(decl.name.name, ty, local);

        let mut text = ExprText::atom(declaration);
        if let Some(value) = value {
            text.text.push_str(" = ");
            let offset = text.text.len();
            text.text.push_str(&value.text);
            text.mappings.extend(value.mappings.into_iter().map(|mut m| {
                m.shift(offset);
                m
            }));
        }
        Ok(Some(text))
    }

    fn for_loop(&mut self, for_stmt: &ForStmt<'_>) -> Result<()> {
        let init = match for_stmt.init {
            Some(Stmt::VarDecl(decl)) => self.var_decl(decl)?,
            Some(Stmt::Expr(expr_stmt)) => Some(self.expr(expr_stmt.expr)?),
            Some(other) => {
                return Err(CompileError::Untranslatable {
                    construct: "for initializer".into(),
                    span: other.span(),
                });
            }
            None => None,
        };
        let condition = for_stmt.condition.map(|c| self.reported_condition(c));
        let mut updates = Vec::with_capacity(for_stmt.update.len());
        for update in for_stmt.update {
            updates.push(self.expr(update)?);
        }

        self.out.write_indent().write("for (");
        if let Some(init) = init {
            self.out.append_mapped(&init.text, &init.mappings);
        }
        self.out.write("; ");
        match condition {
            Some(Some(condition)) => {
                self.out.append_mapped(&condition.text, &condition.mappings);
            }
            Some(None) => {
                self.out.write("false");
            }
            None => {}
        }
        self.out.write("; ");
        for (i, update) in updates.into_iter().enumerate() {
            if i > 0 {
                self.out.write(", ");
            }
            self.out.append_mapped(&update.text, &update.mappings);
        }
        self.out.write(")\n");
        self.body(for_stmt.body);
        Ok(())
    }
}
