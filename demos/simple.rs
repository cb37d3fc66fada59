use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use tracing_subscriber::EnvFilter;
use tsumiki::*;

// Define regular traits and implementor structs

trait Logger: Send + Sync {
    fn log(&self, content: &str);
}

trait DateLogger: Send + Sync {
    fn log_date(&self);
}

struct LoggerImpl {
    prefix: String,
}

impl Logger for LoggerImpl {
    fn log(&self, content: &str) {
        println!("{}{}", self.prefix, content);
    }
}

struct DateLoggerImpl {
    logger: Arc<dyn Logger>,
}

impl DateLogger for DateLoggerImpl {
    fn log_date(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        self.logger.log(&format!("{}s since epoch", now.as_secs()));
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Declare the nodes, nothing is built yet
    let tsumiki = Tsumiki::new();
    let env = tsumiki.environment()?;
    let prefix = tsumiki.declare(|env: Environment| format!("[{env}] "), &[&env])?;
    let logger = tsumiki.declare(
        |handle: Handle, prefix: String| -> Arc<dyn Logger> {
            handle.append_teardown(|| {
                println!("logger closed");
                Ok::<_, BoxError>(())
            });
            Arc::new(LoggerImpl { prefix })
        },
        &[&prefix],
    )?;
    let date_logger = tsumiki.declare(
        |logger: Arc<dyn Logger>| -> Arc<dyn DateLogger> { Arc::new(DateLoggerImpl { logger }) },
        &[&logger],
    )?;

    // Resolve in a request scope
    let scope = Scope::new();
    scope.resolve(&date_logger)?.log_date();
    scope.teardown()?;

    // Another scope with a substituted environment
    let scope = Scope::new();
    scope.override_with(&env, &tsumiki.craft(Environment::Test))?;
    scope.resolve(&date_logger)?.log_date();
    scope.teardown()?;

    Ok(())
}
