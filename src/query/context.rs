use std::collections::BTreeMap;

use serde_json::Value;

/// Caller identity and tenant, passed explicitly into every compile and
/// assembly call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestContext {
    /// Tenant the caller acts for.
    pub company_id: Option<String>,
    /// Acting user.
    pub user_id: Option<String>,
    /// Result of the permission layer's "elevated access" predicate.
    pub elevated: bool,
    /// Extra values referenced by relationship `context_key`s.
    pub values: BTreeMap<String, Value>,
}

impl RequestContext {
    /// Context for a regular member of `company_id`.
    pub fn tenant(company_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let mut values = BTreeMap::new();
        values.insert("userId".to_owned(), Value::String(user_id.clone()));
        Self {
            company_id: Some(company_id.into()),
            user_id: Some(user_id),
            elevated: false,
            values,
        }
    }

    /// Context for an actor exempt from tenant scoping.
    pub fn elevated(user_id: impl Into<String>) -> Self {
        let mut ctx = Self::tenant(String::new(), user_id);
        ctx.company_id = None;
        ctx.elevated = true;
        ctx
    }

    /// Context with no identity at all, used by maintenance jobs.
    pub fn system() -> Self {
        Self {
            elevated: true,
            ..Self::default()
        }
    }

    /// Sets the tenant.
    pub fn with_company(mut self, company_id: impl Into<String>) -> Self {
        self.company_id = Some(company_id.into());
        self
    }

    /// Adds a value addressable by `context_key`.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Looks up a context value; `companyId` and `userId` are always available.
    pub fn value(&self, key: &str) -> Option<Value> {
        match key {
            "companyId" => self.company_id.clone().map(Value::String),
            "userId" => self.user_id.clone().map(Value::String),
            other => self.values.get(other).cloned(),
        }
    }
}
