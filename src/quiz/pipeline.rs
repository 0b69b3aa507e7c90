//! Quiz creation workflow: summarize -> enhance -> generate -> [answer_key].

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::prompts;
use super::types::{
    AnswerKeyOutput, Blueprint, DocumentSummary, EnhancedPrompt, GeneratedQuestions, Question,
    ANSWER_UNAVAILABLE,
};
use crate::error::{PipelineError, PipelineResult};
use crate::llm::StructuredAgent;
use crate::metrics;
use crate::workflow::{
    CompiledGraph, GraphError, Node, Route, StateGraph, Target, WorkflowError, WorkflowState,
};

pub const PIPELINE_NAME: &str = "quiz_creation";

pub const SUMMARIZE: &str = "summarize";
pub const ENHANCE: &str = "enhance";
pub const GENERATE: &str = "generate";
pub const ANSWER_KEY: &str = "answer_key";

/// Inputs for one quiz creation run.
#[derive(Debug, Clone, Default)]
pub struct QuizInput {
    pub extracted_text: String,
    pub blueprint: Blueprint,
    pub professor_note: Option<String>,
}

/// Running state of a quiz creation run.
#[derive(Debug, Clone, Default)]
pub struct QuizState {
    pub extracted_text: String,
    pub blueprint: Blueprint,
    pub professor_note: Option<String>,
    pub summary: Option<DocumentSummary>,
    pub enhanced_prompt: Option<String>,
    pub questions: Option<Vec<Question>>,
}

impl From<QuizInput> for QuizState {
    fn from(input: QuizInput) -> Self {
        Self {
            extracted_text: input.extracted_text,
            blueprint: input.blueprint,
            professor_note: input.professor_note,
            ..Self::default()
        }
    }
}

/// The fields a quiz node may set.
#[derive(Debug)]
pub enum QuizUpdate {
    Summary(DocumentSummary),
    EnhancedPrompt(String),
    Questions(Vec<Question>),
}

impl WorkflowState for QuizState {
    type Update = QuizUpdate;

    fn apply(&mut self, update: QuizUpdate) {
        match update {
            QuizUpdate::Summary(summary) => self.summary = Some(summary),
            QuizUpdate::EnhancedPrompt(prompt) => self.enhanced_prompt = Some(prompt),
            QuizUpdate::Questions(questions) => self.questions = Some(questions),
        }
    }
}

/// Branch taken after `generate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerKeyRoute {
    /// At least one question lacks a correct answer.
    Needed,
    /// Every question already has one.
    Complete,
}

impl Route for AnswerKeyRoute {
    fn variants() -> &'static [Self] {
        &[AnswerKeyRoute::Needed, AnswerKeyRoute::Complete]
    }

    fn target(self) -> Target {
        match self {
            AnswerKeyRoute::Needed => Target::Node(ANSWER_KEY),
            AnswerKeyRoute::Complete => Target::End,
        }
    }
}

pub fn needs_answer_key(state: &QuizState) -> AnswerKeyRoute {
    let missing = state
        .questions
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|q| !q.has_answer());

    if missing {
        AnswerKeyRoute::Needed
    } else {
        AnswerKeyRoute::Complete
    }
}

struct Summarize {
    agent: StructuredAgent,
}

#[async_trait]
impl Node<QuizState> for Summarize {
    async fn run(&self, state: &QuizState) -> PipelineResult<QuizUpdate> {
        if state.extracted_text.trim().is_empty() {
            return Err(PipelineError::InputMissing("extracted_text".to_string()));
        }

        let summary: DocumentSummary = self
            .agent
            .call(SUMMARIZE, &prompts::summarize(&state.extracted_text))
            .await?;
        debug!(topics = summary.key_topics.len(), "Document summarized");
        Ok(QuizUpdate::Summary(summary))
    }
}

struct Enhance {
    agent: StructuredAgent,
}

#[async_trait]
impl Node<QuizState> for Enhance {
    async fn run(&self, state: &QuizState) -> PipelineResult<QuizUpdate> {
        let summary = state
            .summary
            .as_ref()
            .ok_or_else(|| PipelineError::InputMissing("summary".to_string()))?;
        if state.blueprint.is_empty() {
            return Err(PipelineError::InputMissing("blueprint".to_string()));
        }

        let prompt = prompts::enhance(
            &summary.summary,
            &state.blueprint,
            state.professor_note.as_deref(),
        );
        let enhanced: EnhancedPrompt = self.agent.call(ENHANCE, &prompt).await?;

        let instruction = enhanced.enhanced_prompt.trim();
        if instruction.is_empty() {
            return Err(PipelineError::AgentFailure(
                "enhance agent returned an empty instruction".to_string(),
            ));
        }
        Ok(QuizUpdate::EnhancedPrompt(instruction.to_string()))
    }
}

struct Generate {
    agent: StructuredAgent,
}

#[async_trait]
impl Node<QuizState> for Generate {
    async fn run(&self, state: &QuizState) -> PipelineResult<QuizUpdate> {
        let instruction = state
            .enhanced_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| PipelineError::InputMissing("enhanced_prompt".to_string()))?;

        let output: GeneratedQuestions =
            self.agent.call(GENERATE, &prompts::generate(instruction)).await?;
        if output.questions.is_empty() {
            return Err(PipelineError::AgentFailure(
                "generate agent returned no questions".to_string(),
            ));
        }

        let questions: Vec<Question> = output
            .questions
            .into_iter()
            .map(|mut q| {
                // Blank answers are treated as missing so answer_key picks them up.
                if !q.has_answer() {
                    q.correct_answer = None;
                }
                q
            })
            .collect();

        debug!(count = questions.len(), "Questions generated");
        Ok(QuizUpdate::Questions(questions))
    }
}

struct AnswerKey {
    agent: StructuredAgent,
}

#[async_trait]
impl Node<QuizState> for AnswerKey {
    async fn run(&self, state: &QuizState) -> PipelineResult<QuizUpdate> {
        let questions = state
            .questions
            .as_deref()
            .filter(|q| !q.is_empty())
            .ok_or_else(|| PipelineError::InputMissing("questions".to_string()))?;

        let output: AnswerKeyOutput = self
            .agent
            .call(ANSWER_KEY, &prompts::answer_key(questions))
            .await?;

        Ok(QuizUpdate::Questions(merge_answer_key(questions, output)?))
    }
}

/// Fills missing answers from the answer key agent's echoed list.
///
/// Entries are matched by position. Everything except a previously missing
/// `correct_answer` is kept from `questions`.
pub fn merge_answer_key(
    questions: &[Question],
    output: AnswerKeyOutput,
) -> PipelineResult<Vec<Question>> {
    if output.questions.len() != questions.len() {
        return Err(PipelineError::AgentFailure(format!(
            "answer key agent returned {} questions, expected {}",
            output.questions.len(),
            questions.len()
        )));
    }

    let mut unavailable = 0;
    let merged = questions
        .iter()
        .zip(output.questions)
        .map(|(question, entry)| {
            if question.has_answer() {
                return question.clone();
            }

            let answer = entry
                .correct_answer
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty() && !a.eq_ignore_ascii_case(ANSWER_UNAVAILABLE))
                .unwrap_or_else(|| ANSWER_UNAVAILABLE.to_string());
            if answer == ANSWER_UNAVAILABLE {
                unavailable += 1;
            }

            Question {
                correct_answer: Some(answer),
                ..question.clone()
            }
        })
        .collect();

    if unavailable > 0 {
        warn!(unavailable, "Answer key could not determine some answers");
    }
    Ok(merged)
}

/// Result of a completed quiz creation run.
#[derive(Debug, Clone)]
pub struct QuizOutput {
    pub summary: DocumentSummary,
    pub enhanced_prompt: String,
    pub questions: Vec<Question>,
    /// True if the answer_key node ran.
    pub answer_key_applied: bool,
}

/// Compiled quiz creation workflow.
#[derive(Debug)]
pub struct QuizCreationPipeline {
    graph: CompiledGraph<QuizState>,
}

impl QuizCreationPipeline {
    /// Builds the workflow around a shared agent client.
    ///
    /// # Errors
    ///
    /// Returns a `GraphError` if the graph fails validation.
    pub fn new(agent: StructuredAgent) -> Result<Self, GraphError> {
        Self::with_step_limit(agent, crate::workflow::DEFAULT_STEP_LIMIT)
    }

    pub fn with_step_limit(agent: StructuredAgent, step_limit: usize) -> Result<Self, GraphError> {
        let graph = StateGraph::new(PIPELINE_NAME)
            .add_node(SUMMARIZE, Summarize { agent: agent.clone() })?
            .add_node(ENHANCE, Enhance { agent: agent.clone() })?
            .add_node(GENERATE, Generate { agent: agent.clone() })?
            .add_node(ANSWER_KEY, AnswerKey { agent })?
            .set_entry(SUMMARIZE)
            .with_step_limit(step_limit)
            .add_edge(SUMMARIZE, Target::Node(ENHANCE))?
            .add_edge(ENHANCE, Target::Node(GENERATE))?
            .add_conditional_edge(GENERATE, needs_answer_key)?
            .add_edge(ANSWER_KEY, Target::End)?
            .compile()?;

        Ok(Self { graph })
    }

    /// Runs the workflow to completion.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError::NodeFailed` with the first node error.
    pub async fn run(&self, input: QuizInput) -> Result<QuizOutput, WorkflowError> {
        info!(
            text_chars = input.extracted_text.chars().count(),
            has_note = input.professor_note.is_some(),
            "Starting quiz creation"
        );

        let execution = match self.graph.invoke(QuizState::from(input)).await {
            Ok(execution) => execution,
            Err(err) => {
                metrics::record_pipeline_run(PIPELINE_NAME, "failure");
                return Err(err);
            }
        };

        let answer_key_applied = execution.visited(ANSWER_KEY);
        let state = execution.state;

        // The graph only reaches End after generate, which sets every field.
        let (Some(summary), Some(enhanced_prompt), Some(questions)) =
            (state.summary, state.enhanced_prompt, state.questions)
        else {
            metrics::record_pipeline_run(PIPELINE_NAME, "failure");
            return Err(WorkflowError::NodeFailed {
                node: GENERATE,
                source: PipelineError::InputMissing("questions".to_string()),
            });
        };

        metrics::record_pipeline_run(PIPELINE_NAME, "success");
        info!(
            questions = questions.len(),
            answer_key_applied,
            "Quiz creation completed"
        );

        Ok(QuizOutput {
            summary,
            enhanced_prompt,
            questions,
            answer_key_applied,
        })
    }
}
