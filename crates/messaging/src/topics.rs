use common::Env;

/// Per-user topic naming. Non-production environments carry the
/// environment tag so they can share a bus with production.
#[derive(Clone, Debug)]
pub struct Topics {
    prefix: String,
    env: Env,
}

impl Topics {
    pub fn new(prefix: impl Into<String>, env: Env) -> Self {
        Self {
            prefix: prefix.into(),
            env,
        }
    }

    pub fn user(&self, user_id: i64) -> String {
        match self.env {
            Env::Prod => format!("{}-user-{}", self.prefix, user_id),
            env => format!("{}-{}-user-{}", self.prefix, env, user_id),
        }
    }
}
