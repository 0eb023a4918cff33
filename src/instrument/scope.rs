//! Scoped task spans
//!
//! A [`TaskScope`] owns the span of one ETL task. Identity and start time are
//! recorded when it is created; end time and final status are written when it
//! is dropped, whichever way the task exits.

use chrono::{SecondsFormat, Utc};
use opentelemetry::trace::{Status, TraceContextExt, Tracer as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::{SdkTracer, Span};
use std::fmt;

use super::output::TaskOutput;
use super::system::SystemInfo;
use crate::extract::record::{
    ERROR_MESSAGE_KEY, ERROR_TYPE_KEY, GROUP_NAME_KEY, PLATFORM_KEY, PROCESS_COUNT_KEY,
    PROCESS_NAME_KEY, SCRIPT_NAME_KEY,
};
use crate::extract::timing::{END_TIME_KEY, START_TIME_KEY};

const STACKTRACE_KEY: &str = "etl.stacktrace";

/// Identity of one task run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub group_name: String,
    pub process_name: String,
    pub script_name: Option<String>,
}

impl TaskContext {
    pub fn new(group_name: impl Into<String>, process_name: impl Into<String>) -> Self {
        Self {
            group_name: group_name.into(),
            process_name: process_name.into(),
            script_name: None,
        }
    }

    pub fn with_script_name(mut self, script_name: impl Into<String>) -> Self {
        self.script_name = Some(script_name.into());
        self
    }
}

/// The open span of one task
pub struct TaskScope {
    tracer: SdkTracer,
    cx: Context,
    failure: Option<String>,
}

impl fmt::Debug for TaskScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskScope")
            .field("span_context", self.cx.span().span_context())
            .field("failed", &self.failure.is_some())
            .finish()
    }
}

impl TaskScope {
    pub(crate) fn start(tracer: SdkTracer, platform: Option<&str>, context: TaskContext) -> Self {
        let span = tracer.start(context.process_name.clone());
        let cx = Context::current_with_span(span);

        let span = cx.span();
        if let Some(platform) = platform {
            span.set_attribute(KeyValue::new(PLATFORM_KEY, platform.to_string()));
        }
        span.set_attribute(KeyValue::new(GROUP_NAME_KEY, context.group_name));
        span.set_attribute(KeyValue::new(PROCESS_NAME_KEY, context.process_name));
        if let Some(script_name) = context.script_name {
            span.set_attribute(KeyValue::new(SCRIPT_NAME_KEY, script_name));
        }
        span.set_attribute(KeyValue::new(START_TIME_KEY, now_iso()));

        Self {
            tracer,
            cx,
            failure: None,
        }
    }

    /// Run `task` inside a new scope
    ///
    /// The output count is recorded on success and the error on failure; the
    /// result is returned unchanged.
    pub fn run<F, E>(
        handle: &super::TelemetryHandle,
        context: TaskContext,
        task: F,
    ) -> Result<TaskOutput, E>
    where
        F: FnOnce(&mut TaskScope) -> Result<TaskOutput, E>,
        E: fmt::Debug + fmt::Display,
    {
        let mut scope = handle.start_task(context);
        let result = task(&mut scope);
        match &result {
            Ok(output) => scope.record_output(output),
            Err(e) => scope.fail_with(e),
        }
        result
    }

    /// Record how many records the task produced
    pub fn record_output(&mut self, output: &TaskOutput) {
        self.cx.span().set_attribute(KeyValue::new(
            PROCESS_COUNT_KEY,
            output.process_count() as i64,
        ));
    }

    pub fn set_source(&mut self, info: &SystemInfo) {
        self.set_system("source", info);
    }

    pub fn set_target(&mut self, info: &SystemInfo) {
        self.set_system("target", info);
    }

    fn set_system(&mut self, side: &str, info: &SystemInfo) {
        let span = self.cx.span();
        let key = |field: &str| format!("etl.{}_{}", side, field);

        span.set_attribute(KeyValue::new(key("system_type"), info.system_type.as_str()));
        span.set_attribute(KeyValue::new(key("system_name"), info.system_name.clone()));
        if let Some(ref endpoint) = info.endpoint {
            span.set_attribute(KeyValue::new(key("endpoint"), endpoint.clone()));
        }
        if let Some(ref object_name) = info.object_name {
            span.set_attribute(KeyValue::new(key("object_name"), object_name.clone()));
        }
        if let Some(count) = info.count {
            span.set_attribute(KeyValue::new(key("count"), count));
        }
    }

    /// Mark the task as failed
    pub fn fail(&mut self, error_type: impl Into<String>, message: impl Into<String>) {
        let message = message.into();
        let span = self.cx.span();
        span.set_attribute(KeyValue::new(ERROR_TYPE_KEY, error_type.into()));
        span.set_attribute(KeyValue::new(ERROR_MESSAGE_KEY, message.clone()));
        self.failure = Some(message);
    }

    /// Mark the task as failed with `error`
    ///
    /// The error type is the unqualified Rust type name and the debug
    /// rendering is kept as `etl.stacktrace`.
    pub fn fail_with<E>(&mut self, error: &E)
    where
        E: fmt::Debug + fmt::Display + ?Sized,
    {
        self.fail(short_type_name::<E>(), error.to_string());
        self.cx
            .span()
            .set_attribute(KeyValue::new(STACKTRACE_KEY, format!("{:?}", error)));
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }

    /// Start a plain span in the same trace, e.g. around a client call
    ///
    /// Attributes set on it should stay outside the `etl.` namespace so it is
    /// correlated with this task rather than treated as one.
    pub fn start_child(&self, name: impl Into<String>) -> Span {
        self.tracer.start_with_context(name.into(), &self.cx)
    }

    /// Context carrying this task's span, for propagation
    pub fn context(&self) -> &Context {
        &self.cx
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        if self.failure.is_none() && std::thread::panicking() {
            self.fail("panic", "task panicked");
        }

        let span = self.cx.span();
        span.set_attribute(KeyValue::new(END_TIME_KEY, now_iso()));
        match self.failure.take() {
            Some(message) => span.set_status(Status::error(message)),
            None => span.set_status(Status::Ok),
        }
        span.end();
    }
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
