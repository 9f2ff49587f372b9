//! Semantic analysis.
//!
//! Post-order walk over the AST: builtin calls are checked against their
//! signatures, variable definedness and types are tracked in source
//! order, and declarations get their stack slots assigned. Runs after
//! parsing and before code generation; the code generator trusts what is
//! recorded here.

use crate::ast::{Body, Branch, Cond, Expr, FuncCall, If, Stmt, While};
use crate::context::{CompileInfo, STR_BUFFER_WORDS};
use crate::diagnostics::CompileError;
use crate::dictionary::{FuncId, VarType};

/// Argument classes a builtin can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgClass {
    Var,
    Const,
    Lstr,
    /// Anything that evaluates to a number: int variable, constant,
    /// arithmetic tree or int-returning value function.
    NumGeneral,
    /// Anything with a memory address: int variable or array access.
    InMemory,
}

/// How a correct call of one builtin looks.
struct FunctionSpec {
    name: &'static str,
    types: &'static [ArgClass],
    /// Expected var types of exact-class `Var` arguments, in order.
    info: &'static [VarType],
    /// `(argument index, type)` pairs the call defines.
    defines: &'static [(usize, VarType)],
}

fn func_spec(func: FuncId) -> &'static FunctionSpec {
    match func {
        FuncId::Print => &FunctionSpec {
            name: "print",
            types: &[ArgClass::Lstr],
            info: &[],
            defines: &[],
        },
        FuncId::Exit => &FunctionSpec {
            name: "exit",
            types: &[ArgClass::NumGeneral],
            info: &[],
            defines: &[],
        },
        FuncId::Read => &FunctionSpec {
            name: "read",
            types: &[ArgClass::Var],
            info: &[VarType::Str],
            defines: &[],
        },
        FuncId::Set => &FunctionSpec {
            name: "set",
            types: &[ArgClass::InMemory, ArgClass::NumGeneral],
            info: &[VarType::Int],
            defines: &[],
        },
        FuncId::Add => &FunctionSpec {
            name: "add",
            types: &[ArgClass::InMemory, ArgClass::NumGeneral],
            info: &[VarType::Int],
            defines: &[],
        },
        FuncId::Sub => &FunctionSpec {
            name: "sub",
            types: &[ArgClass::InMemory, ArgClass::NumGeneral],
            info: &[VarType::Int],
            defines: &[],
        },
        FuncId::Break => &FunctionSpec {
            name: "break",
            types: &[],
            info: &[],
            defines: &[],
        },
        FuncId::Continue => &FunctionSpec {
            name: "continue",
            types: &[],
            info: &[],
            defines: &[],
        },
        FuncId::Putchar => &FunctionSpec {
            name: "putchar",
            types: &[ArgClass::NumGeneral],
            info: &[],
            defines: &[],
        },
        FuncId::Int => &FunctionSpec {
            name: "int",
            types: &[ArgClass::Var, ArgClass::NumGeneral],
            info: &[VarType::Int],
            defines: &[(0, VarType::Int)],
        },
        FuncId::Array => &FunctionSpec {
            name: "array",
            types: &[ArgClass::Var, ArgClass::Const],
            info: &[VarType::Arr],
            defines: &[(0, VarType::Arr)],
        },
        FuncId::Str => &FunctionSpec {
            name: "str",
            types: &[ArgClass::Var],
            info: &[VarType::Str],
            defines: &[(0, VarType::Str)],
        },
    }
}

/// Check the whole tree. Definedness transitions are recorded in source
/// order, so a use before its defining statement fails even though the
/// variable is interned.
pub fn semantic_analysis(root: &Body, c_info: &mut CompileInfo) -> Result<(), CompileError> {
    analyze_body(root, c_info)
}

fn analyze_body(body: &Body, c_info: &mut CompileInfo) -> Result<(), CompileError> {
    c_info.err.set_line(body.line);
    for child in &body.children {
        analyze_stmt(child, c_info)?;
    }
    Ok(())
}

fn analyze_stmt(stmt: &Stmt, c_info: &mut CompileInfo) -> Result<(), CompileError> {
    match stmt {
        Stmt::If(chain) => analyze_if(chain, c_info),
        Stmt::While(While { line, cond, body }) => {
            c_info.err.set_line(*line);
            analyze_cond(cond, c_info)?;
            analyze_body(body, c_info)
        }
        Stmt::Func(call) => analyze_func(call, c_info),
    }
}

fn analyze_if(node: &If, c_info: &mut CompileInfo) -> Result<(), CompileError> {
    c_info.err.set_line(node.line);
    analyze_cond(&node.cond, c_info)?;
    analyze_body(&node.body, c_info)?;
    match node.alt.as_deref() {
        Some(Branch::Elif(elif)) => analyze_if(elif, c_info),
        Some(Branch::Else(els)) => analyze_body(&els.body, c_info),
        None => Ok(()),
    }
}

fn analyze_cond(cond: &Cond, c_info: &mut CompileInfo) -> Result<(), CompileError> {
    match cond {
        Cond::Cmp { line, left, cmp } => {
            c_info.err.set_line(*line);
            analyze_expr(left, c_info)?;
            if let Some((_, right)) = cmp {
                analyze_expr(right, c_info)?;
            }
            Ok(())
        }
        Cond::Log { left, right, .. } => {
            analyze_cond(left, c_info)?;
            analyze_cond(right, c_info)
        }
    }
}

fn analyze_func(call: &FuncCall, c_info: &mut CompileInfo) -> Result<(), CompileError> {
    c_info.err.set_line(call.line);

    let spec = func_spec(call.func);
    check_correct_function_call(spec, &call.args, c_info)?;

    for arg in &call.args {
        analyze_expr(arg, c_info)?;
    }

    // Declarations reserve their stack words once checked.
    match call.func {
        FuncId::Int => {
            let var_id = expect_var_id(&call.args[0]);
            let offset = c_info.allocate_stack(1);
            c_info.known_vars[var_id].stack_offset = offset;
            c_info.known_vars[var_id].stack_units = 1;
        }
        FuncId::Array => {
            let var_id = expect_var_id(&call.args[0]);
            let units = match call.args[1] {
                Expr::Const { value, .. } => value,
                _ => unreachable!("checked as Const"),
            };
            c_info
                .err
                .on_false(units > 0, "Array size must be positive")?;
            let offset = c_info.allocate_stack(units);
            c_info.known_vars[var_id].stack_offset = offset;
            c_info.known_vars[var_id].stack_units = units;
        }
        FuncId::Str => {
            let var_id = expect_var_id(&call.args[0]);
            let offset = c_info.allocate_stack(STR_BUFFER_WORDS);
            // The length slot sits directly below the buffer.
            c_info.allocate_stack(1);
            c_info.known_vars[var_id].stack_offset = offset;
            c_info.known_vars[var_id].stack_units = STR_BUFFER_WORDS + 1;
        }
        _ => {}
    }

    Ok(())
}

fn expect_var_id(arg: &Expr) -> usize {
    match arg {
        Expr::Var { var_id, .. } => *var_id,
        _ => unreachable!("checked as Var"),
    }
}

fn check_correct_function_call(
    spec: &FunctionSpec,
    args: &[Expr],
    c_info: &mut CompileInfo,
) -> Result<(), CompileError> {
    // Defining arguments are marked first so the call passes its own
    // checks below.
    for &(index, var_type) in spec.defines {
        debug_assert!(index < spec.types.len());

        let var_id = match args.get(index) {
            Some(Expr::Var { var_id, .. }) => *var_id,
            _ => {
                return Err(c_info.err.error(format!(
                    "Argument {} to '{}' expected to be variable",
                    index, spec.name
                )));
            }
        };
        c_info.err.on_true(
            c_info.known_vars[var_id].defined,
            format!(
                "Argument {} to '{}' expected to be undefined",
                index, spec.name
            ),
        )?;
        c_info.known_vars[var_id].defined = true;
        c_info.known_vars[var_id].var_type = var_type;
        if var_type == VarType::Arr {
            c_info.known_vars[var_id].is_array = true;
        }
    }

    c_info.err.on_false(
        args.len() == spec.types.len(),
        format!(
            "Expected {} arguments to function '{}', got {}",
            spec.types.len(),
            spec.name,
            args.len()
        ),
    )?;

    let mut info_it = spec.info.iter();

    for (i, arg) in args.iter().enumerate() {
        match spec.types[i] {
            ArgClass::NumGeneral => {
                c_info.err.on_false(
                    matches!(
                        arg,
                        Expr::Var { .. }
                            | Expr::Const { .. }
                            | Expr::Arit { .. }
                            | Expr::VFunc { .. }
                    ),
                    format!(
                        "Argument {} to '{}' has to evaluate to a number",
                        i, spec.name
                    ),
                )?;

                if let Expr::Var { var_id, .. } = arg {
                    let v_info = &c_info.known_vars[*var_id];
                    c_info.err.on_false(
                        v_info.defined,
                        format!("Var '{}' is undefined at this time", v_info.name),
                    )?;
                    c_info.err.on_false(
                        v_info.var_type == VarType::Int,
                        format!(
                            "Argument {} to '{}' has to have type '{}' but has '{}'",
                            i,
                            spec.name,
                            VarType::Int.as_str(),
                            v_info.var_type.as_str()
                        ),
                    )?;
                } else if let Expr::VFunc {
                    func, return_type, ..
                } = arg
                {
                    c_info.err.on_false(
                        *return_type == VarType::Int,
                        format!(
                            "Argument {} to '{}' has to evaluate to a number; got '{}' returning '{}'",
                            i,
                            spec.name,
                            func.name(),
                            return_type.as_str()
                        ),
                    )?;
                }
            }
            ArgClass::InMemory => {
                c_info.err.on_false(
                    matches!(arg, Expr::Var { .. } | Expr::Access { .. }),
                    format!(
                        "Argument {} to '{}' has to have a memory address",
                        i, spec.name
                    ),
                )?;

                if let Expr::Var { var_id, .. } = arg {
                    let v_info = &c_info.known_vars[*var_id];
                    c_info.err.on_false(
                        v_info.defined,
                        format!("Var '{}' is undefined at this time", v_info.name),
                    )?;
                    c_info.err.on_false(
                        v_info.var_type == VarType::Int,
                        format!(
                            "Argument {} to '{}' has to have type '{}' but has '{}'",
                            i,
                            spec.name,
                            VarType::Int.as_str(),
                            v_info.var_type.as_str()
                        ),
                    )?;
                } else if let Expr::Access { array_id, .. } = arg {
                    let v_info = &c_info.known_vars[*array_id];
                    c_info.err.on_false(
                        v_info.defined,
                        format!("Var '{}' is undefined at this time", v_info.name),
                    )?;
                    c_info.err.on_false(
                        v_info.var_type == VarType::Arr,
                        format!(
                            "Argument {} to '{}' has to have type '{}' but has '{}'",
                            i,
                            spec.name,
                            VarType::Arr.as_str(),
                            v_info.var_type.as_str()
                        ),
                    )?;
                }
            }
            ArgClass::Var => {
                c_info.err.on_false(
                    matches!(arg, Expr::Var { .. }),
                    format!("Argument {} to function '{}' is wrong type", i, spec.name),
                )?;
            }
            ArgClass::Const => {
                c_info.err.on_false(
                    matches!(arg, Expr::Const { .. }),
                    format!("Argument {} to function '{}' is wrong type", i, spec.name),
                )?;
            }
            ArgClass::Lstr => {
                c_info.err.on_false(
                    matches!(arg, Expr::Lstr { .. }),
                    format!("Argument {} to function '{}' is wrong type", i, spec.name),
                )?;
            }
        }

        // Exact-class var arguments are additionally checked against the
        // signature's type info list.
        if matches!(arg, Expr::Var { .. }) && spec.types[i] != ArgClass::NumGeneral {
            let expected = info_it.next().ok_or_else(|| {
                c_info.err.error(format!(
                    "Could not parse arguments to function '{}'",
                    spec.name
                ))
            })?;

            if let Expr::Var { var_id, .. } = arg {
                let v_info = &c_info.known_vars[*var_id];
                c_info.err.on_false(
                    v_info.defined,
                    format!("Var '{}' is undefined at this time", v_info.name),
                )?;
                c_info.err.on_false(
                    v_info.var_type == *expected,
                    format!(
                        "Argument {} to '{}' has to have type '{}' but has '{}'",
                        i,
                        spec.name,
                        expected.as_str(),
                        v_info.var_type.as_str()
                    ),
                )?;
            }
        }
    }

    Ok(())
}

fn analyze_expr(expr: &Expr, c_info: &mut CompileInfo) -> Result<(), CompileError> {
    c_info.err.set_line(expr.line());

    match expr {
        Expr::Const { .. } | Expr::Str { .. } | Expr::VFunc { .. } => Ok(()),
        Expr::Var { var_id, .. } => {
            let v_info = &c_info.known_vars[*var_id];
            c_info.err.on_false(
                v_info.defined,
                format!("Variable '{}' is undefined at this time", v_info.name),
            )
        }
        Expr::Access {
            array_id, index, ..
        } => {
            let v_info = &c_info.known_vars[*array_id];
            c_info.err.on_false(
                v_info.is_array,
                format!("Variable '{}' is not an array", v_info.name),
            )?;
            c_info.err.on_false(
                v_info.defined,
                format!("Array '{}' is undefined at this time", v_info.name),
            )?;
            analyze_expr(index, c_info)
        }
        Expr::Arit { left, right, .. } => {
            analyze_expr(left, c_info)?;
            analyze_expr(right, c_info)
        }
        Expr::Lstr { format, .. } => {
            for part in format {
                analyze_expr(part, c_info)?;
            }
            Ok(())
        }
    }
}
