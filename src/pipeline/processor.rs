//! Processing engine: walks the rule tree against the mailbox.
//!
//! For each thread rule the store is queried, matching threads are visited in
//! store order, and within each level actions run in stage order:
//!
//! 1. `pre-main` actions
//! 2. `main` actions
//! 3. child entities (messages of a thread, attachments of a message)
//! 4. `post-main` actions
//!
//! Failures are recorded in the [`ProcessingResult`] against the rule that
//! raised them and processing continues with the next sibling.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::actions::{ActionArgs, ActionRegistry};
use crate::config::{
    ActionConfig, AttachmentConfig, Config, MarkProcessedMethod, MessageConfig, ProcessingStage,
    RunMode,
};
use crate::context::{
    AttachmentContext, EvalContext, MessageContext, ProcessingContext, ThreadContext,
};
use crate::error::{ConfigError, Result};
use crate::pattern;
use crate::pipeline::matcher::{AttachmentMatcher, MessageMatcher, ThreadMatcher};
use crate::pipeline::types::{ProcessingResult, RunStatus};
use crate::store::{FileStore, MailStore};

const STAGES: [ProcessingStage; 2] = [ProcessingStage::PreMain, ProcessingStage::Main];

/// An action together with its rule location.
type Located<'c> = (String, &'c ActionConfig);

fn located<'c>(prefix: &str, actions: &'c [ActionConfig]) -> Vec<Located<'c>> {
    actions
        .iter()
        .enumerate()
        .map(|(i, a)| (format!("{prefix}.actions[{i}]"), a))
        .collect()
}

/// Resolve placeholders in every argument against `ctx`.
fn resolve_args(
    ctx: &EvalContext<'_>,
    args: &serde_json::Map<String, serde_json::Value>,
) -> std::result::Result<ActionArgs, ConfigError> {
    let mut resolved = serde_json::Map::with_capacity(args.len());
    for (key, value) in args {
        resolved.insert(key.clone(), pattern::substitute_json(ctx, value)?);
    }
    Ok(ActionArgs::from(resolved))
}

struct AttachmentRule<'c> {
    index: usize,
    location: String,
    config: &'c AttachmentConfig,
    matcher: AttachmentMatcher,
}

struct MessageRule<'c> {
    index: usize,
    location: String,
    config: &'c MessageConfig,
    matcher: MessageMatcher,
    attachments: Vec<AttachmentRule<'c>>,
}

/// Compile message rules. Rules with invalid regexes are recorded and left out.
fn compile_message_rules<'c>(
    messages: &'c [MessageConfig],
    prefix: &str,
    result: &mut ProcessingResult,
) -> Vec<MessageRule<'c>> {
    let mut rules = Vec::with_capacity(messages.len());
    for (index, config) in messages.iter().enumerate() {
        let location = format!("{prefix}.messages[{index}]");
        let matcher = match MessageMatcher::compile(&config.match_) {
            Ok(m) => m,
            Err(e) => {
                result.record_error(location, None, e);
                continue;
            }
        };
        let mut attachments = Vec::with_capacity(config.attachments.len());
        for (index, config) in config.attachments.iter().enumerate() {
            let location = format!("{location}.attachments[{index}]");
            match AttachmentMatcher::compile(&config.match_) {
                Ok(matcher) => attachments.push(AttachmentRule {
                    index,
                    location,
                    config,
                    matcher,
                }),
                Err(e) => result.record_error(location, None, e),
            }
        }
        rules.push(MessageRule {
            index,
            location,
            config,
            matcher,
            attachments,
        });
    }
    rules
}

/// Runs configurations against a mailbox.
pub struct Processor {
    mail: Arc<dyn MailStore>,
    files: Arc<dyn FileStore>,
    registry: ActionRegistry,
}

impl Processor {
    pub fn new(
        mail: Arc<dyn MailStore>,
        files: Arc<dyn FileStore>,
        registry: ActionRegistry,
    ) -> Self {
        Self {
            mail,
            files,
            registry,
        }
    }

    /// Processor with the built-in action catalog.
    pub fn with_builtins(mail: Arc<dyn MailStore>, files: Arc<dyn FileStore>) -> Self {
        Self::new(mail, files, ActionRegistry::with_builtins())
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Process `config` once, stopping after `settings.maxRuntime`.
    ///
    /// Only run-wide setup failures return `Err`; everything else is collected
    /// in the result.
    pub async fn run(&self, config: &Config, run_mode: RunMode) -> Result<ProcessingResult> {
        let deadline = Instant::now() + config.settings.max_runtime();
        self.run_until(config, run_mode, deadline).await
    }

    /// Process `config`, scheduling no new thread once `deadline` has passed.
    pub async fn run_until(
        &self,
        config: &Config,
        run_mode: RunMode,
        deadline: Instant,
    ) -> Result<ProcessingResult> {
        let proc = ProcessingContext::new(
            self.mail.clone(),
            self.files.clone(),
            run_mode,
            config.settings.clone(),
        )?
        .with_globals(config.globals.clone());
        let mut result = ProcessingResult::new(run_mode, proc.now);

        info!(
            run_id = %result.run_id,
            mode = %run_mode,
            rules = config.threads.len(),
            "Starting processing run"
        );

        let global = &config.global.thread;
        let global_actions = located("global.thread", &global.actions);

        'rules: for (config_index, rule) in config.threads.iter().enumerate() {
            if deadline_passed(deadline, &mut result) {
                break;
            }
            let location = format!("threads[{config_index}]");
            let matcher = ThreadMatcher::new(&global.match_, &rule.match_);
            let query = match pattern::substitute(&EvalContext::Run(&proc), matcher.query()) {
                Ok(q) => q,
                Err(e) => {
                    result.record_error(location, None, e);
                    continue;
                }
            };

            let messages = rule.effective_messages();
            let message_rules = compile_message_rules(&messages, &location, &mut result);
            let mut actions = global_actions.clone();
            actions.extend(located(&location, &rule.actions));

            let threads = match self
                .mail
                .list_threads(&query, proc.settings.max_batch_size)
                .await
            {
                Ok(t) => t,
                Err(e) => {
                    result.record_error(location, None, e);
                    continue;
                }
            };
            debug!(rule = config_index, query = %query, found = threads.len(), "Listed threads");

            for (index, thread) in threads.into_iter().enumerate() {
                if deadline_passed(deadline, &mut result) {
                    break 'rules;
                }
                if !matcher.matches(&thread) {
                    debug!(
                        thread = %thread.id,
                        messages = thread.message_count,
                        "Thread outside message count bounds"
                    );
                    continue;
                }
                let ctx = ThreadContext::new(&proc, rule, thread, config_index, index);
                self.process_thread(&ctx, &actions, &message_rules, &location, &mut result)
                    .await;
            }
        }

        result.finish();
        info!(
            run_id = %result.run_id,
            status = ?result.status,
            threads = result.processed_threads,
            messages = result.processed_messages,
            attachments = result.processed_attachments,
            actions = result.actions.len(),
            errors = result.errors.len(),
            "Processing run complete"
        );
        Ok(result)
    }

    async fn process_thread(
        &self,
        ctx: &ThreadContext<'_>,
        actions: &[Located<'_>],
        message_rules: &[MessageRule<'_>],
        location: &str,
        result: &mut ProcessingResult,
    ) {
        let thread = &ctx.thread;
        info!(
            thread = %thread.id,
            rule = ctx.config_index,
            subject = %thread.first_message_subject,
            "Processing thread"
        );

        for stage in STAGES {
            self.run_stage(ctx.eval(), actions, stage, result).await;
        }

        if !message_rules.is_empty() {
            match self.mail.list_messages(thread).await {
                Ok(messages) => {
                    let mut marked = HashSet::new();
                    for rule in message_rules {
                        for (index, message) in messages.iter().enumerate() {
                            let Some(matches) = rule.matcher.evaluate(message) else {
                                continue;
                            };
                            let mut message_ctx = MessageContext::new(
                                ctx,
                                rule.config,
                                message.clone(),
                                rule.index,
                                index,
                            );
                            message_ctx.matches = matches;
                            self.process_message(&message_ctx, rule, &mut marked, result)
                                .await;
                        }
                    }
                }
                Err(e) => result.record_error(location, Some(thread.id.clone()), e),
            }
        }

        self.run_stage(ctx.eval(), actions, ProcessingStage::PostMain, result)
            .await;

        let settings = &ctx.proc.settings;
        if settings.mark_processed_method == MarkProcessedMethod::AddLabel {
            let args = serde_json::Map::from_iter([(
                "label".to_string(),
                serde_json::Value::String(settings.mark_processed_label.clone()),
            )]);
            self.dispatch(
                ctx.eval(),
                &format!("{location}.markProcessed"),
                "thread.addLabel",
                &args,
                ProcessingStage::PostMain,
                result,
            )
            .await;
        }

        result.processed_threads += 1;
    }

    async fn process_message(
        &self,
        ctx: &MessageContext<'_>,
        rule: &MessageRule<'_>,
        marked: &mut HashSet<String>,
        result: &mut ProcessingResult,
    ) {
        let message = &ctx.message;
        debug!(
            message = %message.id,
            rule = rule.index,
            subject = %message.subject,
            "Processing message"
        );
        let actions = located(&rule.location, &rule.config.actions);

        for stage in STAGES {
            self.run_stage(ctx.eval(), &actions, stage, result).await;
        }

        if !rule.attachments.is_empty() {
            match self.mail.list_attachments(message).await {
                Ok(attachments) => {
                    for attachment_rule in &rule.attachments {
                        for (index, attachment) in attachments.iter().enumerate() {
                            let Some(matches) = attachment_rule.matcher.evaluate(attachment)
                            else {
                                continue;
                            };
                            let mut attachment_ctx = AttachmentContext::new(
                                ctx,
                                attachment_rule.config,
                                attachment.clone(),
                                attachment_rule.index,
                                index,
                            );
                            attachment_ctx.matches = matches;
                            self.process_attachment(&attachment_ctx, attachment_rule, result)
                                .await;
                        }
                    }
                }
                Err(e) => result.record_error(&rule.location, Some(message.id.clone()), e),
            }
        }

        self.run_stage(ctx.eval(), &actions, ProcessingStage::PostMain, result)
            .await;

        // Once per message, even when several rules match it.
        if ctx.thread_ctx.proc.settings.mark_processed_method == MarkProcessedMethod::MarkRead
            && marked.insert(message.id.clone())
        {
            self.dispatch(
                ctx.eval(),
                &format!("{}.markProcessed", rule.location),
                "message.markRead",
                &serde_json::Map::new(),
                ProcessingStage::PostMain,
                result,
            )
            .await;
        }

        result.processed_messages += 1;
    }

    async fn process_attachment(
        &self,
        ctx: &AttachmentContext<'_>,
        rule: &AttachmentRule<'_>,
        result: &mut ProcessingResult,
    ) {
        debug!(
            attachment = %ctx.attachment.name,
            content_type = %ctx.attachment.content_type,
            size = ctx.attachment.size,
            "Processing attachment"
        );
        let actions = located(&rule.location, &rule.config.actions);
        for stage in [
            ProcessingStage::PreMain,
            ProcessingStage::Main,
            ProcessingStage::PostMain,
        ] {
            self.run_stage(ctx.eval(), &actions, stage, result).await;
        }
        result.processed_attachments += 1;
    }

    async fn run_stage(
        &self,
        ctx: EvalContext<'_>,
        actions: &[Located<'_>],
        stage: ProcessingStage,
        result: &mut ProcessingResult,
    ) {
        for (location, action) in actions.iter().filter(|(_, a)| a.processing_stage == stage) {
            self.dispatch(ctx, location, &action.name, &action.args, stage, result)
                .await;
        }
    }

    /// Resolve arguments and dispatch one action, recording the outcome.
    async fn dispatch(
        &self,
        ctx: EvalContext<'_>,
        location: &str,
        name: &str,
        args: &serde_json::Map<String, serde_json::Value>,
        stage: ProcessingStage,
        result: &mut ProcessingResult,
    ) {
        let entity = ctx.entity_id();
        let args = match resolve_args(&ctx, args) {
            Ok(a) => a,
            Err(e) => {
                result.record_error(location, entity, format!("{name}: {e}"));
                return;
            }
        };
        match self.registry.execute_action(&ctx, name, &args).await {
            Ok(ret) => result.record_action(location.to_string(), entity, stage, ret),
            Err(e) => result.record_error(location, entity, e),
        }
    }
}

/// Flag the run as out of time once `deadline` has passed.
fn deadline_passed(deadline: Instant, result: &mut ProcessingResult) -> bool {
    if Instant::now() < deadline {
        return false;
    }
    warn!(
        run_id = %result.run_id,
        processed_threads = result.processed_threads,
        "Runtime limit reached, stopping run"
    );
    result.status = RunStatus::DeadlineExceeded;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AttachmentMatchConfig, MessageMatchConfig, Settings, ThreadConfig, ThreadMatchConfig,
    };
    use crate::model::{Attachment, ContentHandle, Message, Thread};
    use crate::store::mock::MockStore;
    use std::collections::BTreeMap;

    fn thread(id: &str, messages: i64) -> Thread {
        Thread {
            id: id.into(),
            message_count: messages,
            first_message_subject: "Report".into(),
            ..Default::default()
        }
    }

    fn message(id: &str, subject: &str) -> Message {
        Message {
            id: id.into(),
            from: "alice@example.com".into(),
            subject: subject.into(),
            is_unread: true,
            ..Default::default()
        }
    }

    fn attachment(name: &str) -> Attachment {
        Attachment {
            name: name.into(),
            content_type: "image/png".into(),
            size: 10,
            content: ContentHandle(name.into()),
            ..Default::default()
        }
    }

    fn processor(store: &Arc<MockStore>) -> Processor {
        Processor::with_builtins(store.clone(), store.clone())
    }

    fn config(threads: Vec<ThreadConfig>) -> Config {
        Config {
            threads,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn stages_run_in_order_around_children() {
        let store = Arc::new(
            MockStore::new().with_thread(thread("t1", 1), vec![(message("m1", "Hi"), vec![])]),
        );
        let rule = ThreadConfig {
            actions: vec![
                ActionConfig::new("thread.addLabel")
                    .with_arg("label", "post")
                    .with_stage(ProcessingStage::PostMain),
                ActionConfig::new("thread.addLabel").with_arg("label", "main"),
                ActionConfig::new("thread.addLabel")
                    .with_arg("label", "pre")
                    .with_stage(ProcessingStage::PreMain),
            ],
            messages: vec![MessageConfig {
                actions: vec![ActionConfig::new("message.star")],
                ..Default::default()
            }],
            ..Default::default()
        };

        let result = processor(&store)
            .run(&config(vec![rule]), RunMode::Normal)
            .await
            .unwrap();

        assert!(result.is_complete());
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(
            store.calls(),
            vec![
                "update_thread:t1:AddLabel(\"pre\")",
                "update_thread:t1:AddLabel(\"main\")",
                "update_message:m1:Star",
                "update_message:m1:MarkRead",
                "update_thread:t1:AddLabel(\"post\")",
            ]
        );
        assert_eq!(result.processed_threads, 1);
        assert_eq!(result.processed_messages, 1);
    }

    #[tokio::test]
    async fn add_label_marks_threads_processed() {
        let store = Arc::new(
            MockStore::new().with_thread(thread("t1", 1), vec![(message("m1", "Hi"), vec![])]),
        );
        let mut cfg = config(vec![ThreadConfig {
            messages: vec![MessageConfig::default()],
            ..Default::default()
        }]);
        cfg.settings = Settings {
            mark_processed_method: MarkProcessedMethod::AddLabel,
            mark_processed_label: "processed".into(),
            ..Default::default()
        };

        let result = processor(&store).run(&cfg, RunMode::Normal).await.unwrap();
        assert_eq!(store.calls(), vec!["update_thread:t1:AddLabel(\"processed\")"]);
        assert_eq!(result.actions[0].location, "threads[0].markProcessed");
    }

    #[tokio::test]
    async fn query_is_merged_and_substituted() {
        let store = Arc::new(MockStore::new());
        let mut cfg = config(vec![ThreadConfig {
            match_: ThreadMatchConfig {
                query: "label:${globals.label} to:${user.email}".into(),
                ..Default::default()
            },
            ..Default::default()
        }]);
        cfg.globals = BTreeMap::from([("label".to_string(), "invoices".to_string())]);
        cfg.global.thread.match_.query = "-in:trash".into();
        cfg.global.thread.match_.newer_than = "1d".into();

        processor(&store).run(&cfg, RunMode::Normal).await.unwrap();
        assert_eq!(
            store.queries(),
            vec!["-in:trash label:invoices to:me@example.com newer_than:1d"]
        );
    }

    #[tokio::test]
    async fn captures_flow_into_action_args() {
        let store = Arc::new(MockStore::new().with_thread(
            thread("t1", 1),
            vec![(
                message("m1", "Message 01: Some more text"),
                vec![attachment("scan.png")],
            )],
        ));
        let rule = ThreadConfig {
            messages: vec![MessageConfig {
                match_: MessageMatchConfig {
                    subject: Some(r"Message (?P<num>[0-9]+): (.*)".into()),
                    ..Default::default()
                },
                attachments: vec![AttachmentConfig {
                    match_: AttachmentMatchConfig {
                        name: r"^(.+)\.png$".into(),
                        ..Default::default()
                    },
                    actions: vec![ActionConfig::new("attachment.store").with_arg(
                        "location",
                        "/${message.subject.match.num}/${attachment.name.match.1}-${attachment.index}.png",
                    )],
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut cfg = config(vec![rule]);
        cfg.settings.mark_processed_method = MarkProcessedMethod::None;

        let result = processor(&store).run(&cfg, RunMode::Normal).await.unwrap();
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(store.calls(), vec!["create_file:/01/scan-1.png"]);
        assert_eq!(result.processed_attachments, 1);
        assert_eq!(result.actions[0].entity.as_deref(), Some("m1#1"));
    }

    #[tokio::test]
    async fn thread_level_attachments_apply_to_every_message() {
        let store = Arc::new(MockStore::new().with_thread(
            thread("t1", 2),
            vec![
                (message("m1", "a"), vec![attachment("a.png")]),
                (message("m2", "b"), vec![attachment("b.png")]),
            ],
        ));
        let rule = ThreadConfig {
            attachments: vec![AttachmentConfig {
                actions: vec![
                    ActionConfig::new("attachment.store")
                        .with_arg("location", "/all/${attachment.name}"),
                ],
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut cfg = config(vec![rule]);
        cfg.settings.mark_processed_method = MarkProcessedMethod::None;

        let result = processor(&store).run(&cfg, RunMode::Normal).await.unwrap();
        assert_eq!(
            store.calls(),
            vec!["create_file:/all/a.png", "create_file:/all/b.png"]
        );
        assert_eq!(result.processed_messages, 2);
    }

    #[tokio::test]
    async fn invalid_regex_only_skips_its_rule() {
        let store = Arc::new(
            MockStore::new().with_thread(thread("t1", 1), vec![(message("m1", "Hi"), vec![])]),
        );
        let rule = ThreadConfig {
            messages: vec![
                MessageConfig {
                    match_: MessageMatchConfig {
                        subject: Some("(broken".into()),
                        ..Default::default()
                    },
                    actions: vec![ActionConfig::new("message.unstar")],
                    ..Default::default()
                },
                MessageConfig {
                    actions: vec![ActionConfig::new("message.star")],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let mut cfg = config(vec![rule]);
        cfg.settings.mark_processed_method = MarkProcessedMethod::None;

        let result = processor(&store).run(&cfg, RunMode::Normal).await.unwrap();
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].location, "threads[0].messages[0]");
        assert_eq!(store.calls(), vec!["update_message:m1:Star"]);
    }

    #[tokio::test]
    async fn unresolved_reference_skips_only_that_action() {
        let store = Arc::new(
            MockStore::new().with_thread(thread("t1", 1), vec![(message("m1", "Hi"), vec![])]),
        );
        let rule = ThreadConfig {
            actions: vec![
                ActionConfig::new("thread.addLabel").with_arg("label", "${thread.nope}"),
                ActionConfig::new("thread.addLabel").with_arg("label", "ok"),
                ActionConfig::new("thread.nothing"),
            ],
            ..Default::default()
        };

        let result = processor(&store)
            .run(&config(vec![rule]), RunMode::Normal)
            .await
            .unwrap();
        assert_eq!(store.calls(), vec!["update_thread:t1:AddLabel(\"ok\")"]);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].location, "threads[0].actions[0]");
        assert!(result.errors[0].message.contains("${thread.nope}"));
        assert!(result.errors[1].message.contains("thread.nothing"));
    }

    #[tokio::test]
    async fn invalid_timezone_fails_the_run() {
        let store = Arc::new(MockStore::new());
        let mut cfg = config(vec![]);
        cfg.settings.timezone = "Mars/Olympus".into();
        let err = processor(&store)
            .run(&cfg, RunMode::Normal)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[tokio::test]
    async fn message_count_bounds_filter_threads() {
        let store = Arc::new(
            MockStore::new()
                .with_thread(thread("short", 1), vec![])
                .with_thread(thread("long", 5), vec![]),
        );
        let rule = ThreadConfig {
            match_: ThreadMatchConfig {
                max_message_count: 2,
                ..Default::default()
            },
            actions: vec![ActionConfig::new("thread.markImportant")],
            ..Default::default()
        };

        let result = processor(&store)
            .run(&config(vec![rule]), RunMode::Normal)
            .await
            .unwrap();
        assert_eq!(store.calls(), vec!["update_thread:short:MarkImportant"]);
        assert_eq!(result.processed_threads, 1);
    }

    #[tokio::test]
    async fn passed_deadline_stops_before_querying() {
        let store = Arc::new(
            MockStore::new().with_thread(thread("t1", 1), vec![(message("m1", "Hi"), vec![])]),
        );
        let rule = ThreadConfig {
            actions: vec![ActionConfig::new("thread.markImportant")],
            ..Default::default()
        };

        let result = processor(&store)
            .run_until(&config(vec![rule.clone(), rule]), RunMode::Normal, Instant::now())
            .await
            .unwrap();
        assert_eq!(result.status, RunStatus::DeadlineExceeded);
        assert!(store.queries().is_empty());
        assert!(store.calls().is_empty());
        assert_eq!(result.processed_threads, 0);
    }

    #[tokio::test]
    async fn message_matched_by_two_rules_is_marked_read_once() {
        let store = Arc::new(
            MockStore::new().with_thread(thread("t1", 1), vec![(message("m1", "Hi"), vec![])]),
        );
        let rule = ThreadConfig {
            messages: vec![
                MessageConfig {
                    actions: vec![ActionConfig::new("message.star")],
                    ..Default::default()
                },
                MessageConfig {
                    match_: MessageMatchConfig {
                        from: Some("alice@".into()),
                        ..Default::default()
                    },
                    actions: vec![ActionConfig::new("message.unstar")],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let result = processor(&store)
            .run(&config(vec![rule]), RunMode::Normal)
            .await
            .unwrap();
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_eq!(
            store.calls(),
            vec![
                "update_message:m1:Star",
                "update_message:m1:MarkRead",
                "update_message:m1:Unstar",
            ]
        );
        assert_eq!(result.processed_messages, 2);
    }
}
