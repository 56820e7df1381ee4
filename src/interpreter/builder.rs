use std::collections::HashMap;

use super::{Program, Result, ScriptError, ast::Expr};
use crate::interpreter::ir::{
    BranchArm, Condition, Instruction, NativeCall, NativeOp, Procedure, ProgramIr,
};
use crate::runtime::action_log::ActionId;
use crate::runtime::grid::{Direction, Relative};

/// Build a typed IR from a parsed program.
pub fn build_ir(program: &Program) -> Result<ProgramIr> {
    let mut procedure_index = HashMap::new();
    let mut definitions = Vec::new();
    for form in &program.forms {
        if let Expr::List(items) = form {
            if matches_symbol(items.first(), "define") {
                if items.len() < 2 {
                    return Err(validation("define requires a name"));
                }
                let name = expect_name(&items[1])?;
                if procedure_index
                    .insert(name.clone(), definitions.len())
                    .is_some()
                {
                    return Err(validation(&format!("procedure '{}' defined twice", name)));
                }
                definitions.push((name, &items[2..]));
            }
        }
    }

    let scope = Scope {
        procedures: &procedure_index,
    };

    let mut procedures = Vec::with_capacity(definitions.len());
    for (name, body) in definitions {
        procedures.push(Procedure {
            name,
            body: scope.statements(body)?,
        });
    }

    let mut main = Vec::new();
    let mut seen_program = false;
    for form in &program.forms {
        match form {
            Expr::List(items) if matches_symbol(items.first(), "define") => continue,
            Expr::List(items) if matches_symbol(items.first(), "program") => {
                if seen_program {
                    return Err(validation("only one program form is allowed"));
                }
                seen_program = true;
                if items.len() < 2 {
                    return Err(validation("program requires a name"));
                }
                main.extend(scope.statements(&items[2..])?);
            }
            other => main.push(scope.statement(other)?),
        }
    }

    Ok(ProgramIr {
        name: program.name.clone(),
        main,
        procedures,
    })
}

struct Scope<'a> {
    procedures: &'a HashMap<String, usize>,
}

impl Scope<'_> {
    fn statements(&self, forms: &[Expr]) -> Result<Vec<Instruction>> {
        forms.iter().map(|form| self.statement(form)).collect()
    }

    fn statement(&self, expr: &Expr) -> Result<Instruction> {
        let list = expect_list(expr, "statement")?;
        let head = match list.first() {
            Some(Expr::Symbol(sym)) => sym.as_str(),
            _ => return Err(validation("statement must start with a symbol")),
        };

        match head {
            "move-forward" => native(list, NativeOp::MoveForward),
            "move-backward" => native(list, NativeOp::MoveBackward),
            "turn-left" => native(list, NativeOp::TurnLeft),
            "turn-right" => native(list, NativeOp::TurnRight),
            "finish" => native(list, NativeOp::Finish),
            "turn" => {
                if list.len() != 3 {
                    return Err(validation("turn expects a direction and a block id"));
                }
                let direction = expect_direction(&list[1])?;
                Ok(Instruction::Native(NativeCall {
                    op: NativeOp::Face(direction),
                    block: expect_block_id(&list[2])?,
                }))
            }
            "repeat" => {
                if list.len() < 2 {
                    return Err(validation("repeat requires a count"));
                }
                let times = match &list[1] {
                    Expr::Integer(n) => u32::try_from(*n)
                        .map_err(|_| validation(&format!("repeat count out of range: {}", n)))?,
                    _ => return Err(validation("repeat count must be an integer")),
                };
                Ok(Instruction::Repeat {
                    times,
                    body: self.statements(&list[2..])?,
                })
            }
            "while" | "until" => {
                if list.len() < 2 {
                    return Err(validation(&format!("{} requires a condition", head)));
                }
                let mut condition = parse_condition(&list[1])?;
                if head == "until" {
                    condition = Condition::Not(Box::new(condition));
                }
                Ok(Instruction::While {
                    condition,
                    body: self.statements(&list[2..])?,
                })
            }
            "forever" => Ok(Instruction::Forever(self.statements(&list[1..])?)),
            "if" => {
                if list.len() < 2 {
                    return Err(validation("if requires a condition"));
                }
                Ok(Instruction::Branch {
                    arms: vec![BranchArm {
                        condition: parse_condition(&list[1])?,
                        body: self.statements(&list[2..])?,
                    }],
                    otherwise: None,
                })
            }
            "branch" => self.branch(&list[1..]),
            "call" => {
                if list.len() != 2 {
                    return Err(validation("call expects a procedure name"));
                }
                let name = expect_name(&list[1])?;
                let index = self
                    .procedures
                    .get(&name)
                    .copied()
                    .ok_or_else(|| validation(&format!("unknown procedure '{}'", name)))?;
                Ok(Instruction::Call(index))
            }
            "define" | "program" => Err(validation(&format!("{} is only allowed at top level", head))),
            other => Err(validation(&format!("unknown statement '{}'", other))),
        }
    }

    fn branch(&self, arms: &[Expr]) -> Result<Instruction> {
        let mut branches = Vec::new();
        let mut otherwise = None;
        for arm in arms {
            let list = expect_list(arm, "branch arm")?;
            if otherwise.is_some() {
                return Err(validation("otherwise must be the last branch arm"));
            }
            if matches_symbol(list.first(), "when") {
                if list.len() < 2 {
                    return Err(validation("when requires a condition"));
                }
                branches.push(BranchArm {
                    condition: parse_condition(&list[1])?,
                    body: self.statements(&list[2..])?,
                });
            } else if matches_symbol(list.first(), "otherwise") {
                otherwise = Some(self.statements(&list[1..])?);
            } else {
                return Err(validation("unknown branch arm"));
            }
        }
        Ok(Instruction::Branch {
            arms: branches,
            otherwise,
        })
    }
}

fn native(list: &[Expr], op: NativeOp) -> Result<Instruction> {
    if list.len() != 2 {
        return Err(validation("native call expects exactly one block id"));
    }
    Ok(Instruction::Native(NativeCall {
        op,
        block: expect_block_id(&list[1])?,
    }))
}

fn parse_condition(expr: &Expr) -> Result<Condition> {
    if let Expr::Boolean(flag) = expr {
        return Ok(Condition::Literal(*flag));
    }
    let list = expect_list(expr, "condition")?;
    let head = match list.first() {
        Some(Expr::Symbol(sym)) => sym.as_str(),
        _ => return Err(validation("condition must start with a symbol")),
    };

    let sense = |toward: Relative| -> Result<Condition> {
        if list.len() != 2 {
            return Err(validation("path condition expects exactly one block id"));
        }
        Ok(Condition::Path {
            toward,
            block: expect_block_id(&list[1])?,
        })
    };

    match head {
        "path-ahead" => sense(Relative::Forward),
        "path-right" => sense(Relative::Right),
        "path-behind" => sense(Relative::Back),
        "path-left" => sense(Relative::Left),
        "not-done" => Ok(Condition::NotDone),
        "not" => {
            if list.len() != 2 {
                return Err(validation("not expects a single condition"));
            }
            Ok(Condition::Not(Box::new(parse_condition(&list[1])?)))
        }
        "and" => Ok(Condition::All(
            list[1..].iter().map(parse_condition).collect::<Result<_>>()?,
        )),
        "or" => Ok(Condition::Any(
            list[1..].iter().map(parse_condition).collect::<Result<_>>()?,
        )),
        other => Err(validation(&format!("unknown condition '{}'", other))),
    }
}

fn matches_symbol(expr: Option<&Expr>, expected: &str) -> bool {
    if let Some(Expr::Symbol(sym)) = expr {
        sym == expected
    } else {
        false
    }
}

fn expect_list<'a>(expr: &'a Expr, ctx: &str) -> Result<&'a Vec<Expr>> {
    if let Expr::List(list) = expr {
        Ok(list)
    } else {
        Err(validation(&format!("expected list in {}", ctx)))
    }
}

fn expect_name(expr: &Expr) -> Result<String> {
    match expr {
        Expr::Symbol(sym) => Ok(sym.clone()),
        Expr::String(s) => Ok(s.clone()),
        _ => Err(validation("expected name")),
    }
}

fn expect_block_id(expr: &Expr) -> Result<ActionId> {
    match expr {
        Expr::String(s) | Expr::Symbol(s) if !s.is_empty() => Ok(ActionId::new(s.clone())),
        _ => Err(validation("expected block id")),
    }
}

fn expect_direction(expr: &Expr) -> Result<Direction> {
    match expr {
        Expr::Symbol(s) | Expr::String(s) => s
            .parse()
            .map_err(|err: String| validation(&err)),
        _ => Err(validation("expected direction")),
    }
}

fn validation(msg: &str) -> ScriptError {
    ScriptError::Validation(msg.to_string())
}
