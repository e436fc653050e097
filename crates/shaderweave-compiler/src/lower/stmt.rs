//! Statement lowering.
//!
//! Branches and loops follow the structured form the IR expects: every
//! selection header names its merge block and every loop header names its
//! merge and continue blocks. A statement that fails records its error and
//! lowering carries on with the next one.

use shaderweave_core::{CompileError, Span};
use shaderweave_ir::{BlockId, MergeInfo, Operand};
use shaderweave_parser::ast::{DoWhileStmt, Expr, ForStmt, IfStmt, Stmt, TypeExpr, VarDeclStmt, WhileStmt};

use crate::core_types::{ShaderType, resolve_type};

use super::{AtSpan, BodyLowerer, Local, LoopTargets, Result, is_output_stream};

impl<'b, 't, 'a> BodyLowerer<'b, 't, 'a> {
    /// Lower statements until one ends the current block.
    pub(super) fn block(&mut self, stmts: &[Stmt<'_>]) {
        for stmt in stmts {
            if self.b.is_terminated() {
                break;
            }
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt<'_>) {
        if let Err(error) = self.stmt_inner(stmt) {
            self.error(error);
        }
    }

    fn stmt_inner(&mut self, stmt: &Stmt<'_>) -> Result<()> {
        match stmt {
            Stmt::Expr(expr_stmt) => {
                self.type_of(expr_stmt.expr)?;
                self.eval(expr_stmt.expr)?;
            }
            Stmt::VarDecl(decl) => self.var_decl(decl)?,
            Stmt::Return(ret) => {
                let span = ret.span;
                match ret.value {
                    Some(value) => {
                        let return_type = self.return_type.clone();
                        let value = self.rvalue_as(value, &return_type)?;
                        self.b.ret_value(value).at(span)?;
                    }
                    None => self.implicit_return(span)?,
                }
            }
            Stmt::Break(span) => {
                let target = self.loop_target(*span, "break")?.merge;
                self.b.branch(target).at(*span)?;
            }
            Stmt::Continue(span) => {
                let target = self.loop_target(*span, "continue")?.continue_target;
                self.b.branch(target).at(*span)?;
            }
            Stmt::Block(block) => {
                self.scope.push();
                self.block(block.stmts);
                self.scope.pop();
            }
            Stmt::If(if_stmt) => self.if_stmt(if_stmt)?,
            Stmt::While(while_stmt) => self.while_loop(while_stmt)?,
            Stmt::DoWhile(do_while) => self.do_while(do_while)?,
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

    fn loop_target(&self, span: Span, keyword: &str) -> Result<LoopTargets> {
        self.loops.last().copied().ok_or_else(|| CompileError::TypeMismatch {
            message: format!("'{keyword}' outside a loop"),
            span,
        })
    }

    /// Lower a branch or loop body in its own scope, then jump to `next`
    /// unless the body already left the block.
    fn body(&mut self, stmt: &Stmt<'_>, next: BlockId) -> Result<()> {
        self.scope.push();
        self.stmt(stmt);
        self.scope.pop();
        if !self.b.is_terminated() {
            self.b.branch(next).at(stmt.span())?;
        }
        Ok(())
    }

    fn condition(&mut self, condition: &Expr<'_>) -> Result<Operand> {
        let ty = self.type_of(condition)?;
        if ty != ShaderType::BOOLEAN {
            return Err(CompileError::TypeMismatch {
                message: format!("condition must be Boolean, found {ty}"),
                span: condition.span(),
            });
        }
        self.rvalue(condition)
    }

    /// A condition operand. A bad condition is recorded and replaced by
    /// `false` so the branches and loop bodies still lower and report.
    fn reported_condition(&mut self, condition: &Expr<'_>) -> Operand {
        match self.condition(condition) {
            Ok(operand) => operand,
            Err(error) => {
                self.error(error);
                self.b.const_bool(false)
            }
        }
    }

    fn resolve(&self, expr: &TypeExpr<'_>) -> Result<ShaderType> {
        let library = self.library;
        resolve_type(expr, self.ctx.settings(), &|name| library.contains_type(name))
    }

    fn var_decl(&mut self, decl: &VarDeclStmt<'_>) -> Result<()> {
        let span = decl.span;
        let declared = decl.ty.as_ref().map(|ty| self.resolve(ty)).transpose()?;
        let init_ty = decl.init.map(|init| self.type_of(init)).transpose()?;
        let ty = match (declared, init_ty) {
            (Some(declared), Some(init_ty)) => {
                if !init_ty.converts_to(&declared) {
                    return Err(CompileError::TypeMismatch {
                        message: format!("cannot initialize {declared} from {init_ty}"),
                        span,
                    });
                }
                declared
            }
            (Some(declared), None) => declared,
            (None, Some(init_ty)) => init_ty,
            (None, None) => {
                return Err(CompileError::TypeMismatch {
                    message: format!("cannot infer the type of '{}'", decl.name.name),
                    span,
                });
            }
        };
        if ty.is_void() {
            return Err(CompileError::TypeMismatch {
                message: format!("'{}' cannot be Void", decl.name.name),
                span,
            });
        }
        if is_output_stream(&ty) {
            self.scope.declare(decl.name.name, ty, Local::Stream);
            return Ok(());
        }

        let value = match decl.init {
            Some(init) => self.rvalue_as(init, &ty)?,
            None => self.default_value(&ty, span)?,
        };
        let ir = self.ir_type(&ty, span)?;
        let pointer = self.b.variable(ir, Some(value)).at(span)?;
        // Declared after the initializer so `var x = x;` reads the outer `x`
        self.scope.declare(decl.name.name, ty, Local::Pointer(pointer));
        Ok(())
    }

    fn if_stmt(&mut self, if_stmt: &IfStmt<'_>) -> Result<()> {
        let span = if_stmt.span;
        let condition = self.reported_condition(if_stmt.condition);
        let header = self.b.current_block();
        let then_block = self.b.create_block();
        let merge = self.b.create_block();
        let else_block = match if_stmt.else_stmt {
            Some(_) => self.b.create_block(),
            None => merge,
        };
        self.b.set_merge(header, MergeInfo::Selection { merge });
        self.b.cond_branch(condition, then_block, else_block).at(span)?;

        self.b.switch_to(then_block);
        self.body(if_stmt.then_stmt, merge)?;
        if let Some(else_stmt) = if_stmt.else_stmt {
            self.b.switch_to(else_block);
            self.body(else_stmt, merge)?;
        }
        self.b.switch_to(merge);
        Ok(())
    }

    /// Blocks of a loop: the header carrying the loop merge, and the
    /// targets `break` and `continue` jump to. The header only branches on,
    /// leaving the builder in a fresh block inside the loop.
    fn open_loop(&mut self, span: Span) -> Result<(BlockId, LoopTargets)> {
        let header = self.b.create_block();
        let merge = self.b.create_block();
        let continue_target = self.b.create_block();
        let start = self.b.create_block();
        self.b.branch(header).at(span)?;
        self.b.switch_to(header);
        self.b.set_merge(header, MergeInfo::Loop { merge, continue_target });
        self.b.branch(start).at(span)?;
        self.b.switch_to(start);
        Ok((header, LoopTargets { merge, continue_target }))
    }

    /// Lower `body` as the loop body, with `break` and `continue` bound to
    /// `targets`.
    fn loop_body(&mut self, body: &Stmt<'_>, targets: LoopTargets) -> Result<()> {
        self.loops.push(targets);
        let result = self.body(body, targets.continue_target);
        self.loops.pop();
        result
    }

    /// Branch from the header into the body when `condition` holds.
    fn loop_test(&mut self, condition: Option<&Expr<'_>>, targets: LoopTargets, span: Span) -> Result<BlockId> {
        let body = self.b.create_block();
        match condition {
            Some(condition) => {
                let condition = self.reported_condition(condition);
                self.b.cond_branch(condition, body, targets.merge).at(span)?;
            }
            None => self.b.branch(body).at(span)?,
        }
        Ok(body)
    }

    fn while_loop(&mut self, while_stmt: &WhileStmt<'_>) -> Result<()> {
        let span = while_stmt.span;
        let (header, targets) = self.open_loop(span)?;
        let body = self.loop_test(Some(while_stmt.condition), targets, span)?;

        self.b.switch_to(body);
        self.loop_body(while_stmt.body, targets)?;

        self.b.switch_to(targets.continue_target);
        self.b.branch(header).at(span)?;
        self.b.switch_to(targets.merge);
        Ok(())
    }

    fn do_while(&mut self, do_while: &DoWhileStmt<'_>) -> Result<()> {
        let span = do_while.span;
        let (header, targets) = self.open_loop(span)?;
        self.loop_body(do_while.body, targets)?;

        self.b.switch_to(targets.continue_target);
        let condition = self.reported_condition(do_while.condition);
        self.b.cond_branch(condition, header, targets.merge).at(span)?;
        self.b.switch_to(targets.merge);
        Ok(())
    }

    fn for_loop(&mut self, for_stmt: &ForStmt<'_>) -> Result<()> {
        let span = for_stmt.span;
        if let Some(init) = for_stmt.init {
            self.stmt_inner(init)?;
        }
        let (header, targets) = self.open_loop(span)?;
        let body = self.loop_test(for_stmt.condition, targets, span)?;

        self.b.switch_to(body);
        self.loop_body(for_stmt.body, targets)?;

        self.b.switch_to(targets.continue_target);
        for update in for_stmt.update {
            self.type_of(update)?;
            self.eval(update)?;
        }
        self.b.branch(header).at(span)?;
        self.b.switch_to(targets.merge);
        Ok(())
    }
}
