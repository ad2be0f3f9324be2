//! Declarative permission requirements for call sites.
//!
//! A handler declares what it needs as a [`PermissionRequirement`], either
//! built directly or parsed from the expression form
//!
//! ```text
//! hasPermission(#id, 'ATIVO', 'UPDATE', #filialId)   target, resource, action, context
//! hasPermission(#id, 'ATIVO', { 'UPDATE', #filialId }) resource with [action, context]
//! hasPermission(#target, 'READ')                      legacy: target names the resource
//! ```
//!
//! Arguments are bound by name from an explicit [`CallArgs`] map at call
//! time and the bound requirement is handed to a [`PermissionEvaluator`].

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

use crate::{ContextValue, PermissionEvaluator, Principal};

const UNKNOWN_RESOURCE: &str = "UNKNOWN";

/// Where a requirement parameter gets its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Absent,
    Arg(String),
    Literal(String),
}

impl Binding {
    fn bind(&self, args: &CallArgs) -> ContextValue {
        match self {
            Self::Absent => ContextValue::Absent,
            Self::Arg(name) => args.get(name).cloned().unwrap_or_default(),
            Self::Literal(text) => ContextValue::Raw(text.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSpec {
    Named(String),
    /// Legacy form: the bound target's string form is the resource.
    FromTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequirement {
    target: Binding,
    resource: ResourceSpec,
    action: String,
    context: Binding,
}

impl PermissionRequirement {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            target: Binding::Absent,
            resource: ResourceSpec::Named(resource.into()),
            action: action.into(),
            context: Binding::Absent,
        }
    }

    /// Legacy two-argument form.
    pub fn legacy(target_arg: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            target: Binding::Arg(target_arg.into()),
            resource: ResourceSpec::FromTarget,
            action: action.into(),
            context: Binding::Absent,
        }
    }

    pub fn target_arg(mut self, name: impl Into<String>) -> Self {
        self.target = Binding::Arg(name.into());
        self
    }

    pub fn context_arg(mut self, name: impl Into<String>) -> Self {
        self.context = Binding::Arg(name.into());
        self
    }

    pub fn context_literal(mut self, value: impl Into<String>) -> Self {
        self.context = Binding::Literal(value.into());
        self
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Resolve every parameter against `args`. Unknown names bind to absent.
    pub fn bind(&self, args: &CallArgs) -> BoundRequirement {
        let target = self.target.bind(args);
        let target_id = target.audit_repr();

        match &self.resource {
            ResourceSpec::Named(resource) => BoundRequirement {
                target_id,
                resource: resource.clone(),
                action: self.action.clone(),
                context: self.context.bind(args),
            },
            ResourceSpec::FromTarget => BoundRequirement {
                target_id: None,
                resource: target_id.unwrap_or_else(|| UNKNOWN_RESOURCE.to_string()),
                action: self.action.clone(),
                context: self.context.bind(args),
            },
        }
    }

    pub fn check(
        &self,
        evaluator: &dyn PermissionEvaluator,
        principal: Option<&Principal>,
        args: &CallArgs,
    ) -> Result<(), AccessDenied> {
        let bound = self.bind(args);
        let allowed = evaluator.evaluate(
            principal,
            bound.target_id.as_deref(),
            &bound.resource,
            &bound.action,
            &bound.context,
        );
        if allowed {
            Ok(())
        } else {
            Err(AccessDenied {
                resource: bound.resource,
                action: bound.action,
            })
        }
    }
}

/// A requirement with every parameter resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundRequirement {
    pub target_id: Option<String>,
    pub resource: String,
    pub action: String,
    pub context: ContextValue,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("access denied: {action} on {resource}")]
pub struct AccessDenied {
    pub resource: String,
    pub action: String,
}

/// Named arguments of one call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallArgs(BTreeMap<String, ContextValue>);

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&ContextValue> {
        self.0.get(name)
    }
}

/// A handler that only runs when its requirement is satisfied.
pub struct Guarded<H> {
    requirement: PermissionRequirement,
    evaluator: Arc<dyn PermissionEvaluator>,
    handler: H,
}

impl<H> Guarded<H> {
    pub fn new(
        requirement: PermissionRequirement,
        evaluator: Arc<dyn PermissionEvaluator>,
        handler: H,
    ) -> Self {
        Self {
            requirement,
            evaluator,
            handler,
        }
    }

    pub fn requirement(&self) -> &PermissionRequirement {
        &self.requirement
    }

    pub fn call<T>(&self, principal: Option<&Principal>, args: &CallArgs) -> Result<T, AccessDenied>
    where
        H: Fn(&CallArgs) -> T,
    {
        self.requirement
            .check(self.evaluator.as_ref(), principal, args)?;
        Ok((self.handler)(args))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequirementParseError {
    #[error("expected hasPermission(...)")]
    NotAHasPermissionCall,

    #[error("unsupported argument count {0}; expected 2, 3 or 4")]
    ArgumentCount(usize),

    #[error("malformed argument '{0}'")]
    MalformedArgument(String),

    #[error("expected a quoted literal, found '{0}'")]
    ExpectedLiteral(String),

    #[error("unbalanced quotes or braces")]
    Unbalanced,
}

impl FromStr for PermissionRequirement {
    type Err = RequirementParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .trim()
            .strip_prefix("hasPermission")
            .map(str::trim_start)
            .and_then(|rest| rest.strip_prefix('('))
            .and_then(|rest| rest.trim_end().strip_suffix(')'))
            .ok_or(RequirementParseError::NotAHasPermissionCall)?;

        let args = split_top_level(body)?;
        match args.as_slice() {
            [target, action] => Ok(Self {
                target: parse_binding(target)?,
                resource: ResourceSpec::FromTarget,
                action: parse_literal(action)?,
                context: Binding::Absent,
            }),
            [target, resource, permission] => {
                let inner = permission
                    .strip_prefix('{')
                    .and_then(|p| p.strip_suffix('}'))
                    .map(str::trim);
                let (action, context) = match inner {
                    Some(list) => {
                        let items = split_top_level(list)?;
                        match items.as_slice() {
                            [action] => (parse_literal(action)?, Binding::Absent),
                            [action, context] => (parse_literal(action)?, parse_binding(context)?),
                            _ => return Err(RequirementParseError::MalformedArgument(permission.clone())),
                        }
                    }
                    None => (parse_literal(permission)?, Binding::Absent),
                };
                Ok(Self {
                    target: parse_binding(target)?,
                    resource: ResourceSpec::Named(parse_literal(resource)?),
                    action,
                    context,
                })
            }
            [target, resource, action, context] => Ok(Self {
                target: parse_binding(target)?,
                resource: ResourceSpec::Named(parse_literal(resource)?),
                action: parse_literal(action)?,
                context: parse_binding(context)?,
            }),
            other => Err(RequirementParseError::ArgumentCount(other.len())),
        }
    }
}

fn split_top_level(body: &str) -> Result<Vec<String>, RequirementParseError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quote = false;

    for c in body.chars() {
        match c {
            '\'' => in_quote = !in_quote,
            '{' if !in_quote => depth += 1,
            '}' if !in_quote => {
                depth = depth.checked_sub(1).ok_or(RequirementParseError::Unbalanced)?;
            }
            ',' if !in_quote && depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }

    if in_quote || depth != 0 {
        return Err(RequirementParseError::Unbalanced);
    }
    let last = current.trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last.to_string());
    }
    if parts.iter().any(String::is_empty) {
        return Err(RequirementParseError::MalformedArgument(body.to_string()));
    }
    Ok(parts)
}

fn parse_literal(arg: &str) -> Result<String, RequirementParseError> {
    arg.strip_prefix('\'')
        .and_then(|a| a.strip_suffix('\''))
        .map(str::to_string)
        .ok_or_else(|| RequirementParseError::ExpectedLiteral(arg.to_string()))
}

fn parse_binding(arg: &str) -> Result<Binding, RequirementParseError> {
    if arg == "null" {
        return Ok(Binding::Absent);
    }
    if let Some(name) = arg.strip_prefix('#') {
        let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        return if valid {
            Ok(Binding::Arg(name.to_string()))
        } else {
            Err(RequirementParseError::MalformedArgument(arg.to_string()))
        };
    }
    if arg.starts_with('\'') {
        return parse_literal(arg).map(Binding::Literal);
    }
    if arg.parse::<i64>().is_ok() {
        return Ok(Binding::Literal(arg.to_string()));
    }
    Err(RequirementParseError::MalformedArgument(arg.to_string()))
}
