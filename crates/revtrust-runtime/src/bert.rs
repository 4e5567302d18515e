//! Local BERT sequence classifier (feature `ml`).
//!
//! Loads a fine-tuned two-label classifier exported in the usual layout:
//! `config.json`, `tokenizer.json` and `model.safetensors` in one
//! directory. Label 1 is the genuine class. Logits come from the
//! classifier head over the pooled `[CLS]` state. Runs on CPU.

use std::path::Path;

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use revtrust_core::{ScoringError, SequenceModel, SequenceTokenizer, TokenBatch, TokenizeOptions};

use crate::RuntimeError;

/// Labels the classifier head must produce.
const NUM_LABELS: usize = 2;

/// Tokenizer, encoder, pooler and classification head loaded together.
pub struct BertSequenceClassifier {
    tokenizer: Tokenizer,
    model: BertModel,
    pooler: candle_nn::Linear,
    classifier: candle_nn::Linear,
    device: Device,
}

impl BertSequenceClassifier {
    /// Load from a model directory.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let dir = dir.as_ref();
        let load_err = |what: &str, e: &dyn std::fmt::Display| {
            RuntimeError::Config(format!("{}: {}: {}", dir.display(), what, e))
        };

        let config_str = std::fs::read_to_string(dir.join("config.json"))
            .map_err(|e| load_err("failed to read config.json", &e))?;
        let config_json: serde_json::Value = serde_json::from_str(&config_str)
            .map_err(|e| load_err("failed to parse config.json", &e))?;
        let num_labels = config_json
            .get("id2label")
            .and_then(|v| v.as_object())
            .map(|labels| labels.len())
            .unwrap_or(NUM_LABELS);
        if num_labels != NUM_LABELS {
            return Err(RuntimeError::Config(format!(
                "{}: classifier has {} labels, expected {}",
                dir.display(),
                num_labels,
                NUM_LABELS
            )));
        }

        let bert_config: BertConfig = serde_json::from_value(config_json)
            .map_err(|e| load_err("invalid BERT config", &e))?;

        let tokenizer = Tokenizer::from_file(dir.join("tokenizer.json"))
            .map_err(|e| load_err("failed to load tokenizer", &e))?;

        let device = Device::Cpu;
        let weights = dir.join("model.safetensors");
        // SAFETY: the weights file is only read, and not modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)
                .map_err(|e| load_err("failed to load weights", &e))?
        };

        let hidden = bert_config.hidden_size;
        let model = BertModel::load(vb.pp("bert"), &bert_config)
            .map_err(|e| load_err("failed to load BERT encoder", &e))?;
        let pooler = candle_nn::linear(hidden, hidden, vb.pp("bert").pp("pooler").pp("dense"))
            .map_err(|e| load_err("failed to load pooler", &e))?;
        let classifier = candle_nn::linear(hidden, NUM_LABELS, vb.pp("classifier"))
            .map_err(|e| load_err("failed to load classifier head", &e))?;

        Ok(Self {
            tokenizer,
            model,
            pooler,
            classifier,
            device,
        })
    }

    fn tensor(&self, rows: &[Vec<u32>], seq_len: usize) -> candle_core::Result<Tensor> {
        let flat: Vec<u32> = rows.iter().flatten().copied().collect();
        Tensor::from_vec(flat, (rows.len(), seq_len), &self.device)
    }

    fn run(&self, tokens: &TokenBatch) -> candle_core::Result<Vec<Vec<f64>>> {
        let seq_len = tokens.seq_len();
        let input_ids = self.tensor(&tokens.input_ids, seq_len)?;
        let token_type_ids = self.tensor(&tokens.token_type_ids, seq_len)?;
        let attention_mask = self.tensor(&tokens.attention_mask, seq_len)?;

        let hidden = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        // Pooler over [CLS] (position 0): tanh(dense(h_cls))
        let cls = hidden.i((.., 0))?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?;

        let rows: Vec<Vec<f32>> = logits.to_dtype(DType::F32)?.to_vec2()?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_iter().map(f64::from).collect())
            .collect())
    }
}

impl SequenceTokenizer for BertSequenceClassifier {
    fn tokenize(
        &self,
        text: &str,
        options: &TokenizeOptions,
    ) -> revtrust_core::Result<TokenBatch> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ScoringError::InferenceFailure(format!("tokenization failed: {e}")))?;

        let mut ids = encoding.get_ids().to_vec();
        let mut type_ids = encoding.get_type_ids().to_vec();
        let mut mask = encoding.get_attention_mask().to_vec();

        // Keep the leading tokens and the closing [SEP]
        if options.truncate && ids.len() > options.max_length && options.max_length > 0 {
            let keep = options.max_length - 1;
            for row in [&mut ids, &mut type_ids, &mut mask] {
                let last = row[row.len() - 1];
                row.truncate(keep);
                row.push(last);
            }
        }

        Ok(TokenBatch::single(ids, type_ids, mask))
    }
}

impl SequenceModel for BertSequenceClassifier {
    fn forward(&self, tokens: &TokenBatch) -> revtrust_core::Result<Vec<Vec<f64>>> {
        self.run(tokens)
            .map_err(|e| ScoringError::InferenceFailure(format!("model forward failed: {e}")))
    }
}
