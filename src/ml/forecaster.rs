//! Stacked LSTM price regressor
//!
//! Architecture:
//! - LSTM encoder returning the full hidden sequence
//! - LSTM decoder keeping only its final hidden state
//! - Linear dense layer, then a single linear output
//!
//! Training uses Adam on MSE loss over shuffled mini-batches with
//! loss-based early stopping. The best weights seen are restored when
//! training ends.

use super::scaler::MinMaxScaler;
use super::window::{Window, WindowSet};
use crate::error::{ForecastError, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::rnn::{lstm, LSTMConfig, LSTM};
use candle_nn::{loss, AdamW, Linear, Module, Optimizer, ParamsAdamW, VarBuilder, VarMap, RNN};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Windows per inference pass in `predict_batch`
const PREDICT_CHUNK: usize = 256;

/// Shape and training hyperparameters of a forecaster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecasterConfig {
    pub lookback: usize,
    /// Feature columns per row
    pub input_size: usize,
    /// Column predicted and fed back during autoregression
    pub target_column: usize,
    pub encoder_units: usize,
    pub decoder_units: usize,
    pub dense_units: usize,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub epochs: usize,
    pub patience: usize,
}

impl ForecasterConfig {
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("lookback", self.lookback),
            ("input_size", self.input_size),
            ("encoder_units", self.encoder_units),
            ("decoder_units", self.decoder_units),
            ("dense_units", self.dense_units),
            ("batch_size", self.batch_size),
            ("epochs", self.epochs),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return Err(ForecastError::Config(format!("forecaster {} must be positive", name)));
        }
        if self.target_column >= self.input_size {
            return Err(ForecastError::SchemaMismatch {
                expected: format!("target column < {}", self.input_size),
                found: format!("target column {}", self.target_column),
            });
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ForecastError::Config("forecaster learning_rate must be positive".into()));
        }
        Ok(())
    }
}

/// Outcome of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs_run: usize,
    /// 1-based epoch whose weights were kept
    pub best_epoch: usize,
    pub best_loss: f64,
    /// Mean training loss per epoch
    pub loss_history: Vec<f64>,
    pub stopped_early: bool,
}

/// Loss-based early stopping state
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best_loss: f64,
    best_epoch: usize,
    wait: usize,
}

/// What the training loop should do after an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Loss improved; snapshot the weights
    Improved,
    Continue,
    Stop,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_loss: f64::INFINITY,
            best_epoch: 0,
            wait: 0,
        }
    }

    pub fn update(&mut self, epoch: usize, loss: f64) -> Verdict {
        if loss < self.best_loss {
            self.best_loss = loss;
            self.best_epoch = epoch;
            self.wait = 0;
            return Verdict::Improved;
        }
        self.wait += 1;
        if self.wait >= self.patience {
            Verdict::Stop
        } else {
            Verdict::Continue
        }
    }

    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }
}

struct LstmRegressor {
    encoder: LSTM,
    decoder: LSTM,
    dense: Linear,
    output: Linear,
}

impl LstmRegressor {
    fn new(config: &ForecasterConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let encoder = lstm(
            config.input_size,
            config.encoder_units,
            LSTMConfig::default(),
            vb.pp("encoder"),
        )?;
        let decoder = lstm(
            config.encoder_units,
            config.decoder_units,
            LSTMConfig::default(),
            vb.pp("decoder"),
        )?;
        let dense = candle_nn::linear(config.decoder_units, config.dense_units, vb.pp("dense"))?;
        let output = candle_nn::linear(config.dense_units, 1, vb.pp("output"))?;

        Ok(Self {
            encoder,
            decoder,
            dense,
            output,
        })
    }

    /// `(batch, lookback, features)` in, `(batch, 1)` out
    fn forward(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        let encoded = self.encoder.seq(x)?;
        let encoded = self.encoder.states_to_tensor(&encoded)?;

        let decoded = self.decoder.seq(&encoded)?;
        let last = decoded
            .last()
            .ok_or_else(|| candle_core::Error::Msg("empty input sequence".to_string()))?;

        let hidden = self.dense.forward(&last.h)?;
        self.output.forward(&hidden)
    }
}

/// Trainable LSTM forecaster over normalized windows
pub struct Forecaster {
    config: ForecasterConfig,
    varmap: VarMap,
    model: LstmRegressor,
    device: Device,
}

impl fmt::Debug for Forecaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forecaster")
            .field("config", &self.config)
            .field("device", &self.device)
            .finish()
    }
}

impl Forecaster {
    /// Freshly initialized forecaster on the CPU
    pub fn new(config: ForecasterConfig) -> Result<Self> {
        config.validate()?;
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = LstmRegressor::new(&config, vb)?;

        Ok(Self {
            config,
            varmap,
            model,
            device,
        })
    }

    /// Rebuild a forecaster and load saved parameters
    pub fn load(config: ForecasterConfig, path: &Path) -> Result<Self> {
        let mut forecaster = Self::new(config)?;
        forecaster.varmap.load(path)?;
        debug!("Loaded forecaster weights from {}", path.display());
        Ok(forecaster)
    }

    /// Write parameters as safetensors
    pub fn save(&self, path: &Path) -> Result<()> {
        self.varmap.save(path)?;
        Ok(())
    }

    pub fn config(&self) -> &ForecasterConfig {
        &self.config
    }

    /// Fit on a window set, restoring the best-loss weights at the end
    pub fn train(&mut self, set: &WindowSet) -> Result<TrainingReport> {
        if set.is_empty() {
            return Err(ForecastError::EmptyInput("no training windows".into()));
        }
        if set.targets.len() != set.windows.len() {
            return Err(ForecastError::InvalidData(format!(
                "{} windows but {} targets",
                set.windows.len(),
                set.targets.len()
            )));
        }

        let n = set.len();
        let x = self.windows_to_tensor(&set.windows)?;
        let targets: Vec<f32> = set.targets.iter().map(|&t| t as f32).collect();
        let y = Tensor::from_vec(targets, (n, 1), &self.device)?;

        let params = ParamsAdamW {
            lr: self.config.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(self.varmap.all_vars(), params)?;

        let mut stopping = EarlyStopping::new(self.config.patience);
        let mut best_weights = self.snapshot()?;
        let mut loss_history = Vec::with_capacity(self.config.epochs);
        let mut stopped_early = false;
        let mut indices: Vec<u32> = (0..n as u32).collect();
        let mut rng = rand::rng();

        info!(
            "Training on {} windows (lookback {}, {} features, batch {})",
            n, self.config.lookback, self.config.input_size, self.config.batch_size
        );

        for epoch in 1..=self.config.epochs {
            indices.shuffle(&mut rng);
            let mut total = 0.0;

            for batch in indices.chunks(self.config.batch_size) {
                let idx = Tensor::from_slice(batch, batch.len(), &self.device)?;
                let xb = x.index_select(&idx, 0)?;
                let yb = y.index_select(&idx, 0)?;

                let predictions = self.model.forward(&xb)?;
                let batch_loss = loss::mse(&predictions, &yb)?;
                optimizer.backward_step(&batch_loss)?;

                total += batch_loss.to_scalar::<f32>()? as f64 * batch.len() as f64;
            }

            let epoch_loss = total / n as f64;
            if !epoch_loss.is_finite() {
                return Err(ForecastError::Training(format!(
                    "loss diverged at epoch {}",
                    epoch
                )));
            }
            loss_history.push(epoch_loss);
            debug!("Epoch {}/{}: loss {:.6}", epoch, self.config.epochs, epoch_loss);

            match stopping.update(epoch, epoch_loss) {
                Verdict::Improved => best_weights = self.snapshot()?,
                Verdict::Continue => {}
                Verdict::Stop => {
                    info!(
                        "Early stopping at epoch {} (best epoch {})",
                        epoch,
                        stopping.best_epoch()
                    );
                    stopped_early = true;
                    break;
                }
            }
        }

        self.restore(&best_weights)?;

        let report = TrainingReport {
            epochs_run: loss_history.len(),
            best_epoch: stopping.best_epoch(),
            best_loss: stopping.best_loss(),
            loss_history,
            stopped_early,
        };
        info!(
            "Training finished after {} epochs, best loss {:.6} at epoch {}",
            report.epochs_run, report.best_loss, report.best_epoch
        );
        Ok(report)
    }

    /// One normalized target value for one window
    pub fn predict(&self, window: &Window) -> Result<f64> {
        let values = self.predict_batch(std::slice::from_ref(window))?;
        values
            .into_iter()
            .next()
            .ok_or_else(|| ForecastError::Internal("model returned no prediction".into()))
    }

    /// Normalized predictions for many windows
    pub fn predict_batch(&self, windows: &[Window]) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(windows.len());
        for chunk in windows.chunks(PREDICT_CHUNK) {
            let x = self.windows_to_tensor(chunk)?;
            let y = self.model.forward(&x)?;
            out.extend(y.flatten_all()?.to_vec1::<f32>()?.into_iter().map(f64::from));
        }
        Ok(out)
    }

    /// Autoregressive `horizon`-step forecast in normalized space
    ///
    /// Each step drops the oldest row and appends a copy of the last observed
    /// row with only the target column replaced by the new prediction.
    pub fn forecast(&self, seed: &Window, horizon: usize) -> Result<Vec<f64>> {
        self.check_window(seed)?;
        let last_observed = seed
            .last()
            .cloned()
            .ok_or_else(|| ForecastError::EmptyInput("empty seed window".into()))?;

        let mut window = seed.clone();
        let mut predictions = Vec::with_capacity(horizon);

        for _ in 0..horizon {
            let next = self.predict(&window)?;
            predictions.push(next);

            let mut row = last_observed.clone();
            row[self.config.target_column] = next;
            window.remove(0);
            window.push(row);
        }

        Ok(predictions)
    }

    fn check_window(&self, window: &Window) -> Result<()> {
        if window.len() != self.config.lookback {
            return Err(ForecastError::InsufficientRows {
                lookback: self.config.lookback,
                rows: window.len(),
            });
        }
        if let Some(row) = window.iter().find(|r| r.len() != self.config.input_size) {
            return Err(ForecastError::width_mismatch(self.config.input_size, row.len()));
        }
        Ok(())
    }

    fn windows_to_tensor(&self, windows: &[Window]) -> Result<Tensor> {
        let (lookback, width) = (self.config.lookback, self.config.input_size);
        let mut data = Vec::with_capacity(windows.len() * lookback * width);

        for window in windows {
            self.check_window(window)?;
            for row in window {
                data.extend(row.iter().map(|&v| v as f32));
            }
        }

        Ok(Tensor::from_vec(data, (windows.len(), lookback, width), &self.device)?)
    }

    /// Copy of every parameter tensor
    fn snapshot(&self) -> Result<HashMap<String, Tensor>> {
        let vars = self
            .varmap
            .data()
            .lock()
            .map_err(|_| ForecastError::Internal("parameter map lock poisoned".into()))?;

        let mut copies = HashMap::with_capacity(vars.len());
        for (name, var) in vars.iter() {
            copies.insert(name.clone(), var.as_tensor().copy()?);
        }
        Ok(copies)
    }

    fn restore(&self, snapshot: &HashMap<String, Tensor>) -> Result<()> {
        let vars = self
            .varmap
            .data()
            .lock()
            .map_err(|_| ForecastError::Internal("parameter map lock poisoned".into()))?;

        for (name, var) in vars.iter() {
            if let Some(saved) = snapshot.get(name) {
                var.set(saved)?;
            }
        }
        Ok(())
    }
}

/// Map normalized target predictions back to price space
///
/// Every prediction is placed into a copy of `last_row` (normalized) and the
/// rows are inverse-transformed together; only the target column is kept.
pub fn denormalize_predictions(
    scaler: &MinMaxScaler,
    last_row: &[f64],
    target_column: usize,
    predictions: &[f64],
) -> Result<Vec<f64>> {
    if target_column >= last_row.len() {
        return Err(ForecastError::width_mismatch(target_column + 1, last_row.len()));
    }

    let rows: Vec<Vec<f64>> = predictions
        .iter()
        .map(|&p| {
            let mut row = last_row.to_vec();
            row[target_column] = p;
            row
        })
        .collect();

    Ok(scaler
        .inverse_transform(&rows)?
        .into_iter()
        .map(|row| row[target_column])
        .collect())
}
