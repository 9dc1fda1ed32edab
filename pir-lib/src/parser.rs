use std::collections::{HashMap, HashSet};

use sraa::cfg::{CfgBlock, ControlFlowGraph};
use utils::DiagnosticEmitter;

use crate::{
    ir::*,
    lexer::{Identifier, LexResult, Token, TokenValue},
};

pub struct Parser<'src> {
    current_tok: usize,
    tokens: Vec<Token>,
    unit: Unit,
    declared: HashSet<Identifier>,
    diag: &'src mut DiagnosticEmitter,
}

use TokenValue::*;

const BINARY_OPS: [TokenValue; 9] = [
    Add,
    Sub,
    Mul,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEq,
    GreaterThan,
    GreaterThanOrEq,
];

pub fn is_comparison(tok: TokenValue) -> bool {
    matches!(
        tok,
        Equal | NotEqual | LessThan | LessThanOrEq | GreaterThan | GreaterThanOrEq
    )
}

impl<'src> Parser<'src> {
    pub fn new(lexed: LexResult, diag: &'src mut DiagnosticEmitter) -> Self {
        let LexResult {
            tokens,
            identifiers,
        } = lexed;

        Parser {
            current_tok: 0,
            tokens,
            unit: Unit {
                identifiers,
                ..Unit::default()
            },
            declared: HashSet::new(),
            diag,
        }
    }

    /// Parse and check the whole unit. Errors are reported to the
    /// diagnostic emitter, parsing stops at the first one.
    pub fn parse(mut self) -> Option<Unit> {
        // The lexer already reported why there is nothing to parse.
        if self.tokens.is_empty() {
            return None;
        }
        while !self.is_at_end() {
            self.parse_declaration()?;
        }
        let unit = core::mem::take(&mut self.unit);
        Checker {
            unit: &unit,
            diag: self.diag,
        }
        .check()?;
        Some(unit)
    }

    fn parse_declaration(&mut self) -> Option<()> {
        if self.try_consume(GlobalDecl).is_some() {
            let token = self.consume_global()?;
            self.consume(Colon, "")?;
            let ty = self.parse_type()?;
            self.consume(Semicolon, "")?;
            self.declare(token)?;
            self.unit.globals.push(GlobalVar { token, ty });
            return Some(());
        }

        if self.try_consume(Extern).is_some() {
            let token = self.consume_global()?;
            let (formals, ret_ty) = self.parse_signature()?;
            self.consume(Semicolon, "")?;
            self.declare(token)?;
            self.unit.externs.push(ExternFunction {
                token,
                formals,
                ret_ty,
            });
            return Some(());
        }

        let cfg = self.parse_function()?;
        self.unit.functions.push(cfg);
        Some(())
    }

    fn declare(&mut self, token: Token) -> Option<()> {
        let Global(id) = token.value else {
            unreachable!("declarations are named by global identifiers");
        };
        if !self.declared.insert(id) {
            let name = self.unit.name(id).to_owned();
            self.error(token, &format!("Redefinition of '{name}'."));
            return None;
        }
        Some(())
    }

    fn parse_signature(&mut self) -> Option<(Vec<Variable>, Type)> {
        let mut formals = Vec::new();
        if self.try_consume(LeftParen).is_some() {
            formals = self.parse_formals()?;
        }
        let mut ret = Type::Void;
        if self.try_consume(Colon).is_some() {
            ret = self.parse_type()?;
        }
        Some((formals, ret))
    }

    fn parse_function(&mut self) -> Option<Cfg> {
        let func = self.consume_global()?;
        let (formals, ret_ty) = self.parse_signature()?;
        self.declare(func)?;

        let mut cfg = Cfg::new(func, ret_ty, formals);
        self.consume(LeftBrace, "")?;
        self.parse_function_body(&mut cfg)?;
        self.consume(RightBrace, "")?;

        // Add edges to the Cfg.
        let mut edges = Vec::new();
        for (id, block) in cfg.blocks().iter().enumerate() {
            let targets = match block.operations().last() {
                Some(Operation::Branch {
                    token, then, els, ..
                }) => vec![(*token, *then), (*token, *els)],
                Some(Operation::Jump(token, next)) => vec![(*token, *next)],
                _ => continue,
            };
            for (token, label) in targets {
                let Some(to) = cfg.block_of(label) else {
                    let name = self.unit.name(label).to_owned();
                    self.error(token, &format!("Undefined label '{name}'."));
                    return None;
                };
                edges.push((id, to));
            }
        }
        for (from, to) in edges {
            cfg.add_edge(from, to);
        }

        Some(cfg)
    }

    fn parse_formals(&mut self) -> Option<Vec<Variable>> {
        let mut result = Vec::new();
        if !self.check(RightParen) {
            loop {
                let (_, id) = self.consume_local()?;
                self.consume(Colon, "")?;
                let ty = self.parse_type()?;
                result.push(Variable { id, ty });
                if self.try_consume(Comma).is_none() {
                    break;
                }
            }
        }
        self.consume(RightParen, "")?;
        Some(result)
    }

    fn parse_type(&mut self) -> Option<Type> {
        if self.try_consume(Bool).is_some() {
            return Some(Type::Bool);
        }
        for (tok, bits) in [(I8, 8), (I16, 16), (I32, 32), (I64, 64)] {
            if self.try_consume(tok).is_some() {
                return Some(Type::Int(bits));
            }
        }
        if self.try_consume(Ptr).is_some() {
            self.consume(LeftAngle, "")?;
            let pointee = self.parse_type()?;
            self.consume(RightAngle, "")?;
            return Some(Type::Ptr(Box::new(pointee)));
        }
        if self.try_consume(LeftBracket).is_some() {
            let (element, len) = self.parse_element_and_len()?;
            self.consume(RightBracket, "")?;
            return Some(Type::Array(Box::new(element), len));
        }
        if self.try_consume(LeftAngle).is_some() {
            let (element, len) = self.parse_element_and_len()?;
            self.consume(RightAngle, "")?;
            return Some(Type::Vector(Box::new(element), len));
        }
        if self.try_consume(LeftBrace).is_some() {
            let mut fields = Vec::new();
            if !self.check(RightBrace) {
                loop {
                    fields.push(self.parse_type()?);
                    if self.try_consume(Comma).is_none() {
                        break;
                    }
                }
            }
            self.consume(RightBrace, "")?;
            return Some(Type::Struct(fields));
        }
        self.error(self.peek(), "Type expected.");
        None
    }

    fn parse_element_and_len(&mut self) -> Option<(Type, u64)> {
        let element = self.parse_type()?;
        self.consume(Semicolon, "")?;
        let tok = self.consume(Integer(0), "Length expected.")?;
        let Integer(len) = tok.value else {
            unreachable!("checked by consume");
        };
        let Ok(len) = u64::try_from(len) else {
            self.error(tok, "Length must not be negative.");
            return None;
        };
        Some((element, len))
    }

    fn parse_function_body(&mut self, cfg: &mut Cfg) -> Option<()> {
        let mut block = cfg.new_block();
        let mut is_empty = true;
        while !self.check(RightBrace) {
            if let Label(label) = self.peek().value {
                let tok = self.advance();
                self.consume(Colon, "")?;
                // A leading label names the entry block.
                if !is_empty || cfg.blocks()[block].label().is_some() {
                    block = cfg.new_block();
                }
                if !cfg.set_label(block, label) {
                    let name = self.unit.name(label).to_owned();
                    self.error(tok, &format!("Redefinition of label '{name}'."));
                    return None;
                }
                is_empty = true;
                continue;
            }
            let op = self.parse_operation()?;
            cfg.push(block, op);
            is_empty = false;
        }
        Some(())
    }

    fn parse_operation(&mut self) -> Option<Operation> {
        if let Some(token) = self.try_consume(Store) {
            let pointer = self.consume_operand()?;
            let value = self.consume_operand()?;
            self.consume(Semicolon, "")?;
            return Some(Operation::Store {
                token,
                pointer,
                value,
            });
        }

        if let Some(tok) = self.try_consume(Return) {
            if self.try_consume(Semicolon).is_some() {
                return Some(Operation::Ret(tok, None));
            }
            let value = self.consume_operand()?;
            self.consume(Semicolon, "")?;
            return Some(Operation::Ret(tok, Some(value)));
        }

        if let Some(tok) = self.try_consume(Jump) {
            let target = self.consume_label()?;
            self.consume(Semicolon, "")?;
            return Some(Operation::Jump(tok, target));
        }

        if let Some(token) = self.try_consume(Branch) {
            let cond = self.consume_operand()?;
            let then = self.consume_label()?;
            let els = self.consume_label()?;
            self.consume(Semicolon, "")?;
            return Some(Operation::Branch {
                token,
                cond,
                then,
                els,
            });
        }

        if let Some(tok) = self.try_consume(Nop) {
            self.consume(Semicolon, "")?;
            return Some(Operation::Nop(tok));
        }

        if self.check(Call) {
            return self.parse_call(None);
        }

        let (_, res_id) = self.consume_local()?;
        self.consume(Colon, "")?;
        let ty = self.parse_type()?;
        self.consume(Define, "")?;
        let result = Variable { id: res_id, ty };

        if self.check(Call) {
            return self.parse_call(Some(result));
        }

        if let Some(const_tok) = self.try_consume(Const) {
            let Some(tok) = self.try_consume(Integer(0)) else {
                self.error(const_tok, "Integer constant expected.");
                return None;
            };
            let Integer(value) = tok.value else {
                unreachable!("checked by try_consume");
            };
            self.consume(Semicolon, "")?;
            return Some(Operation::Const {
                token: tok,
                result,
                value,
            });
        }

        if let Some(token) = self.match_tokens(&BINARY_OPS) {
            let lhs = self.consume_operand()?;
            let rhs = self.consume_operand()?;
            self.consume(Semicolon, "")?;
            return Some(Operation::BinaryOp {
                token,
                result,
                lhs,
                rhs,
            });
        }

        if let Some(token) = self.try_consume(Gep) {
            let base = self.consume_operand()?;
            let indices = self.parse_operands()?;
            if indices.is_empty() {
                self.error(token, "At least one index expected.");
                return None;
            }
            return Some(Operation::Gep {
                token,
                result,
                base,
                indices,
            });
        }

        if let Some(token) = self.try_consume(Phi) {
            let incoming = self.parse_operands()?;
            if incoming.is_empty() {
                self.error(token, "At least one incoming value expected.");
                return None;
            }
            return Some(Operation::Phi {
                token,
                result,
                incoming,
            });
        }

        if let Some(token) = self.match_tokens(&[Cast, Sigma, Alloc, Load]) {
            let operand = self.consume_operand()?;
            self.consume(Semicolon, "")?;
            return Some(match token.value {
                Cast => Operation::Cast {
                    token,
                    result,
                    operand,
                },
                Sigma => Operation::Sigma {
                    token,
                    result,
                    operand,
                },
                Alloc => Operation::Alloc {
                    token,
                    result,
                    size: operand,
                },
                _ => Operation::Load {
                    token,
                    result,
                    pointer: operand,
                },
            });
        }

        if let Some(token) = self.try_consume(Realloc) {
            let pointer = self.consume_operand()?;
            let size = self.consume_operand()?;
            self.consume(Semicolon, "")?;
            return Some(Operation::Realloc {
                token,
                result,
                pointer,
                size,
            });
        }

        self.error(self.peek(), "Unexpected token.");
        None
    }

    fn parse_call(&mut self, result: Option<Variable>) -> Option<Operation> {
        let token = self.consume(Call, "")?;
        let callee = self.consume_global()?;
        let Global(callee) = callee.value else {
            unreachable!("checked by consume_global");
        };
        let args = self.parse_operands()?;
        Some(Operation::Call {
            token,
            callee,
            result,
            args,
        })
    }

    /// Operands up to and including the closing semicolon.
    fn parse_operands(&mut self) -> Option<Vec<Identifier>> {
        let mut result = Vec::new();
        while !self.check(Semicolon) {
            result.push(self.consume_operand()?);
        }
        self.consume(Semicolon, "")?;
        Some(result)
    }

    fn peek(&self) -> Token {
        self.tokens[self.current_tok]
    }

    fn previous(&self) -> Token {
        self.tokens[self.current_tok - 1]
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek().value, EndOfFile)
    }

    fn check(&self, tok_val: TokenValue) -> bool {
        if self.is_at_end() {
            false
        } else {
            core::mem::discriminant(&self.peek().value) == core::mem::discriminant(&tok_val)
        }
    }

    fn match_tokens(&mut self, tok_vals: &[TokenValue]) -> Option<Token> {
        if tok_vals.iter().any(|val| self.check(*val)) {
            let prev = self.advance();
            return Some(prev);
        }
        None
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current_tok += 1;
        }
        self.previous()
    }

    fn consume(&mut self, tok_val: TokenValue, s: &str) -> Option<Token> {
        if self.check(tok_val) {
            return Some(self.advance());
        }
        let msg = if s.is_empty() {
            format!("'{tok_val}' expected.")
        } else {
            s.to_owned()
        };
        self.error(self.peek(), &msg);
        None
    }

    fn consume_global(&mut self) -> Option<Token> {
        if let Global(_) = self.peek().value {
            return Some(self.advance());
        }
        self.error(self.peek(), "Global identifier expected.");
        None
    }

    fn consume_local(&mut self) -> Option<(Token, Identifier)> {
        if let Local(id) = self.peek().value {
            return Some((self.advance(), id));
        }
        self.error(self.peek(), "Identifier expected.");
        None
    }

    fn consume_label(&mut self) -> Option<Identifier> {
        if let Label(id) = self.peek().value {
            self.advance();
            return Some(id);
        }
        self.error(self.peek(), "Label expected.");
        None
    }

    fn consume_operand(&mut self) -> Option<Identifier> {
        if let Local(id) | Global(id) = self.peek().value {
            self.advance();
            return Some(id);
        }
        self.error(self.peek(), "Identifier expected.");
        None
    }

    fn try_consume(&mut self, tok_val: TokenValue) -> Option<Token> {
        if self.check(tok_val) {
            return Some(self.advance());
        }
        None
    }

    fn error(&mut self, tok: Token, s: &str) {
        tok.error(self.diag, s);
    }
}

/// Semantic checks over a parsed unit: terminators, single definitions,
/// defined operands and type rules.
struct Checker<'a> {
    unit: &'a Unit,
    diag: &'a mut DiagnosticEmitter,
}

type SymbolTable = HashMap<Identifier, Type>;

impl Checker<'_> {
    fn check(&mut self) -> Option<()> {
        let unit = self.unit;
        for cfg in &unit.functions {
            self.check_blocks(cfg)?;
            let symbols = self.symbols(cfg)?;
            for block in cfg.blocks() {
                for op in block.operations() {
                    self.check_operation(cfg, &symbols, op)?;
                }
            }
        }
        Some(())
    }

    fn error(&mut self, tok: Token, s: &str) {
        tok.error(self.diag, s);
    }

    fn check_blocks(&mut self, cfg: &Cfg) -> Option<()> {
        for block in cfg.blocks() {
            let Some(last) = block.operations().last() else {
                self.error(cfg.get_token(), "Blocks must not be empty.");
                return None;
            };
            if !last.is_terminator() {
                self.error(
                    last.get_token(),
                    "Block terminator expected to be jmp, br, or ret.",
                );
                return None;
            }
            let ops = block.operations();
            if let Some(op) = ops[..ops.len() - 1].iter().find(|op| op.is_terminator()) {
                self.error(op.get_token(), "Terminator must be the last operation of its block.");
                return None;
            }
        }
        Some(())
    }

    fn symbols(&mut self, cfg: &Cfg) -> Option<SymbolTable> {
        let unit = self.unit;
        let mut symbols = SymbolTable::new();
        for Variable { id, ty } in cfg.get_formals() {
            if symbols.insert(*id, ty.clone()).is_some() {
                let name = unit.name(*id);
                self.error(cfg.get_token(), &format!("Redefinition of '{name}'."));
                return None;
            }
        }
        for op in cfg.blocks().iter().flat_map(|b| b.operations()) {
            let Some(Variable { id, ty }) = op.get_result() else {
                continue;
            };
            if *ty == Type::Void {
                self.error(op.get_token(), "Values cannot have void type.");
                return None;
            }
            if symbols.insert(*id, ty.clone()).is_some() {
                let name = unit.name(*id);
                self.error(op.get_token(), &format!("Redefinition of '{name}'."));
                return None;
            }
        }
        Some(symbols)
    }

    fn type_of(&mut self, symbols: &SymbolTable, tok: Token, id: Identifier) -> Option<Type> {
        if let Some(ty) = symbols.get(&id) {
            return Some(ty.clone());
        }
        let unit = self.unit;
        if let Some(global) = unit.global(id) {
            return Some(Type::Ptr(Box::new(global.ty.clone())));
        }
        let name = unit.name(id);
        self.error(tok, &format!("Undefined name '{name}'."));
        None
    }

    fn expect_type(&mut self, t: Token, found: &Type, expected: &Type) -> Option<()> {
        if found == expected {
            return Some(());
        }
        self.error(
            t,
            &format!("'{}' type expected; '{}' found", expected, found),
        );
        None
    }

    fn expect(&mut self, t: Token, holds: bool, what: &str, found: &Type) -> Option<()> {
        if holds {
            return Some(());
        }
        self.error(t, &format!("{what} type expected; '{found}' found"));
        None
    }

    fn check_operation(&mut self, cfg: &Cfg, symbols: &SymbolTable, op: &Operation) -> Option<()> {
        let unit = self.unit;
        let token = op.get_token();
        let ty = |this: &mut Self, id: Identifier| this.type_of(symbols, token, id);
        match op {
            Operation::Const { result, .. } => {
                self.expect(token, result.ty.is_int(), "Integer", &result.ty)?;
            }
            Operation::BinaryOp {
                token,
                result,
                lhs,
                rhs,
            } => {
                let lhs = ty(self, *lhs)?;
                let rhs = ty(self, *rhs)?;
                self.expect_type(*token, &rhs, &lhs)?;
                if is_comparison(token.value) {
                    self.expect_type(*token, &result.ty, &Type::Bool)?;
                } else {
                    self.expect(*token, lhs.is_int(), "Integer", &lhs)?;
                    self.expect_type(*token, &result.ty, &lhs)?;
                }
            }
            Operation::Gep {
                result,
                base,
                indices,
                ..
            } => {
                let base = ty(self, *base)?;
                self.expect(token, base.is_ptr(), "Pointer", &base)?;
                self.expect(token, result.ty.is_ptr(), "Pointer", &result.ty)?;
                for index in indices {
                    let index = ty(self, *index)?;
                    self.expect(token, index.is_int(), "Integer", &index)?;
                }
            }
            Operation::Cast { operand, .. } => {
                ty(self, *operand)?;
            }
            Operation::Sigma {
                result, operand, ..
            } => {
                let operand = ty(self, *operand)?;
                self.expect_type(token, &operand, &result.ty)?;
            }
            Operation::Phi {
                result, incoming, ..
            } => {
                for value in incoming {
                    let value = ty(self, *value)?;
                    self.expect_type(token, &value, &result.ty)?;
                }
            }
            Operation::Alloc { result, size, .. } => {
                self.expect(token, result.ty.is_ptr(), "Pointer", &result.ty)?;
                let size = ty(self, *size)?;
                self.expect(token, size.is_int(), "Integer", &size)?;
            }
            Operation::Realloc {
                result,
                pointer,
                size,
                ..
            } => {
                self.expect(token, result.ty.is_ptr(), "Pointer", &result.ty)?;
                let pointer = ty(self, *pointer)?;
                self.expect(token, pointer.is_ptr(), "Pointer", &pointer)?;
                let size = ty(self, *size)?;
                self.expect(token, size.is_int(), "Integer", &size)?;
            }
            Operation::Load { pointer, .. } => {
                let pointer = ty(self, *pointer)?;
                self.expect(token, pointer.is_ptr(), "Pointer", &pointer)?;
            }
            Operation::Store { pointer, value, .. } => {
                let pointer = ty(self, *pointer)?;
                self.expect(token, pointer.is_ptr(), "Pointer", &pointer)?;
                ty(self, *value)?;
            }
            Operation::Call {
                callee,
                result,
                args,
                ..
            } => {
                let (formals, ret) = if let Some(callee) = unit.function(*callee) {
                    (callee.get_formals(), callee.get_return_type())
                } else if let Some(ext) = unit.extern_function(*callee) {
                    (ext.formals.as_slice(), &ext.ret_ty)
                } else {
                    let name = unit.name(*callee);
                    self.error(token, &format!("Undefined function '{name}'."));
                    return None;
                };

                match result {
                    Some(result) => {
                        if *ret == Type::Void {
                            self.error(token, "Void functions cannot return a value.");
                            return None;
                        }
                        self.expect_type(token, &result.ty, ret)?;
                    }
                    None => {
                        if *ret != Type::Void {
                            self.error(token, "Non-void functions must return a value.");
                            return None;
                        }
                    }
                }

                // Missing trailing arguments are allowed, the callee sees
                // unknown values for them.
                if args.len() > formals.len() {
                    self.error(
                        token,
                        &format!(
                            "At most {} arguments expected, got {}",
                            formals.len(),
                            args.len()
                        ),
                    );
                    return None;
                }

                for (formal, arg) in formals.iter().zip(args.iter()) {
                    let arg = ty(self, *arg)?;
                    self.expect_type(token, &arg, &formal.ty)?;
                }
            }
            Operation::Branch { cond, .. } => {
                let cond = ty(self, *cond)?;
                self.expect_type(token, &cond, &Type::Bool)?;
            }
            Operation::Ret(_, value) => {
                let ret_ty = cfg.get_return_type();
                match value {
                    Some(value) => {
                        if *ret_ty == Type::Void {
                            self.error(token, "Void functions cannot return a value.");
                            return None;
                        }
                        let value = ty(self, *value)?;
                        self.expect_type(token, &value, ret_ty)?;
                    }
                    None => {
                        if *ret_ty != Type::Void {
                            self.error(token, "Non-void functions must return a value.");
                            return None;
                        }
                    }
                }
            }
            Operation::Jump(..) | Operation::Nop(_) => {}
        }
        Some(())
    }
}
