//! Bounded execute/repair state machine for a single template on a single
//! dataset.

use tracing::{debug, warn};

use super::Repairer;
use crate::engine::QueryExecutor;
use crate::types::{QueryLanguage, Template};
use crate::{Error, Result};

/// Why the last execution did not pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Failure {
    /// Executed fine but returned fewer results than required.
    Shortfall(u64),
    /// Execution raised.
    Error(String),
}

/// Terminal state of a loop run.
#[derive(Debug, Clone)]
pub(crate) struct LoopOutcome {
    /// Template that was executed last.
    pub template: Template,
    /// Result count of the last execution.
    pub count: u64,
    /// `None` when the last execution passed.
    pub failure: Option<Failure>,
    /// Successful repairs applied.
    pub repairs: u32,
    /// Executions performed.
    pub executions: u32,
}

impl LoopOutcome {
    pub(crate) const fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

enum Step {
    Execute { attempt: u32 },
    Repair { attempt: u32, failure: Failure },
    Finished(Option<Failure>),
}

pub(crate) struct RepairLoop<'a> {
    pub executor: &'a dyn QueryExecutor,
    pub repairer: Option<&'a dyn Repairer>,
    pub language: QueryLanguage,
    pub dataset: &'a str,
    /// Total executions allowed, repairs included.
    pub max_attempts: u32,
    /// Results needed to pass.
    pub min_count: u64,
}

impl RepairLoop<'_> {
    const fn unit(&self) -> &'static str {
        if self.language.is_structured() {
            "hits"
        } else {
            "rows"
        }
    }

    /// Reason text handed to the repairer and surfaced on failure.
    pub(crate) fn describe(&self, failure: &Failure, attempt: u32) -> String {
        match failure {
            Failure::Shortfall(0) => format!(
                "Query returned 0 {} (attempt {attempt}/{})",
                self.unit(),
                self.max_attempts.max(1)
            ),
            Failure::Shortfall(n) => format!(
                "Query returned only {n} {unit}, at least {min} {unit} needed (attempt {attempt}/{max})",
                unit = self.unit(),
                min = self.min_count,
                max = self.max_attempts.max(1)
            ),
            Failure::Error(e) => e.clone(),
        }
    }

    async fn execute(&self, template: &Template) -> Result<u64> {
        if self.language.is_structured() {
            let body = template.structured_body()?;
            self.executor.execute_structured(self.dataset, &body).await
        } else {
            let query = template.as_text().ok_or_else(|| {
                Error::Parse("Textual template must be a query string".to_string())
            })?;
            self.executor
                .execute_textual(self.language, self.dataset, query)
                .await
        }
    }

    /// Run to a terminal state.
    ///
    /// Every transition is explicit: execute, then either finish or repair,
    /// and a repair only happens while the attempt budget allows another
    /// execution. Success ends the loop immediately.
    pub(crate) async fn run(&self, initial: Template) -> LoopOutcome {
        let max = self.max_attempts.max(1);
        let mut template = initial;
        let mut count = 0;
        let mut repairs = 0;
        let mut executions = 0;
        let mut step = Step::Execute { attempt: 1 };

        loop {
            step = match step {
                Step::Execute { attempt } => {
                    executions += 1;
                    match self.execute(&template).await {
                        Ok(n) if n >= self.min_count => {
                            count = n;
                            Step::Finished(None)
                        },
                        Ok(n) => {
                            count = n;
                            Step::Repair {
                                attempt,
                                failure: Failure::Shortfall(n),
                            }
                        },
                        Err(e) => {
                            count = 0;
                            Step::Repair {
                                attempt,
                                failure: Failure::Error(e.to_string()),
                            }
                        },
                    }
                },
                Step::Repair { attempt, failure } => {
                    let reason = self.describe(&failure, attempt);
                    debug!(dataset = self.dataset, attempt, max, %reason, "execution failed");
                    match self.repairer {
                        Some(repairer) if attempt < max => {
                            match repairer
                                .repair(self.language, self.dataset, &template, &reason)
                                .await
                            {
                                Ok(fixed) if !fixed.is_empty() => {
                                    template = fixed;
                                    repairs += 1;
                                    Step::Execute {
                                        attempt: attempt + 1,
                                    }
                                },
                                Ok(_) => {
                                    warn!(dataset = self.dataset, "repair returned an empty template");
                                    Step::Finished(Some(failure))
                                },
                                Err(e) => {
                                    warn!(dataset = self.dataset, error = %e, "repair failed");
                                    Step::Finished(Some(failure))
                                },
                            }
                        },
                        _ => Step::Finished(Some(failure)),
                    }
                },
                Step::Finished(failure) => {
                    return LoopOutcome {
                        template,
                        count,
                        failure,
                        repairs,
                        executions,
                    };
                },
            };
        }
    }
}
