//! Record → text → tokens → projected example.

use crate::{
    ExampleTokenizer, FormattedExample, Projection, PromptTemplate, Record, TextEncoder,
    TokenizedExample,
};
use foamtune_core::Result;
use rayon::prelude::*;

/// Formatter, tokenizer and projection applied to a batch of records.
#[derive(Debug)]
pub struct PreparePipeline<E> {
    template: PromptTemplate,
    tokenizer: ExampleTokenizer<E>,
    projection: Projection,
}

impl<E: TextEncoder> PreparePipeline<E> {
    /// Assemble a pipeline.
    pub fn new(template: PromptTemplate, tokenizer: ExampleTokenizer<E>, projection: Projection) -> Self {
        Self {
            template,
            tokenizer,
            projection,
        }
    }

    /// The prompt template.
    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// The example tokenizer.
    pub fn tokenizer(&self) -> &ExampleTokenizer<E> {
        &self.tokenizer
    }

    /// Format, tokenize and project one record.
    pub fn process(&self, record: &Record) -> Result<TokenizedExample> {
        let formatted = self.template.format(record)?;
        let example = self.tokenizer.tokenize(&formatted.text)?;
        Ok(self.projection.apply(example))
    }

    /// Process a batch in parallel.
    ///
    /// Output order matches input order. The failing record with the
    /// lowest index aborts the batch. An empty batch yields no examples
    /// and skips the schema check.
    pub fn run(&self, records: &[Record]) -> Result<Vec<TokenizedExample>> {
        self.run_with(records, || {})
    }

    /// Like [`run`](Self::run), calling `on_record` after each record.
    pub fn run_with<F>(&self, records: &[Record], on_record: F) -> Result<Vec<TokenizedExample>>
    where
        F: Fn() + Sync,
    {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let columns = Projection::upstream_columns(records);
        self.projection.check_schema(&columns)?;

        let results: Vec<Result<TokenizedExample>> = records
            .par_iter()
            .enumerate()
            .map(|(index, record)| {
                let result = self.process(record).map_err(|e| e.at_record(index));
                on_record();
                result
            })
            .collect();

        let examples = results.into_iter().collect::<Result<Vec<_>>>()?;
        tracing::info!(
            examples = examples.len(),
            max_length = self.tokenizer.max_length(),
            "Tokenized batch"
        );
        Ok(examples)
    }
}

/// Render every record with `template`, in parallel and in order.
pub fn format_all(template: &PromptTemplate, records: &[Record]) -> Result<Vec<FormattedExample>> {
    let results: Vec<Result<FormattedExample>> = records
        .par_iter()
        .enumerate()
        .map(|(index, record)| template.format(record).map_err(|e| e.at_record(index)))
        .collect();
    results.into_iter().collect()
}
