use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;

use crate::activation::activation::ActivationFunction;
use crate::error::{NnError, Result};
use crate::layers::dense::Layer;
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::math::matrix::Matrix;
use crate::network::gradients::Gradients;
use crate::network::spec::NetworkSpec;

/// Fully-connected feedforward network: hidden layers use ReLU or Sigmoid,
/// the output layer is always Softmax.
///
/// Samples are row vectors: inputs are `(1, layer_sizes[0])`, outputs and
/// one-hot targets are `(1, layer_sizes[last])`. Weight layer `i` holds a
/// `(layer_sizes[i], layer_sizes[i + 1])` weight matrix and a
/// `(1, layer_sizes[i + 1])` bias row.
#[derive(Debug, Clone)]
pub struct Network {
    layer_sizes: Vec<usize>,
    layers: Vec<Layer>,
    /// Activations of the last `feed_forward`/`back_propagate` call,
    /// input included.
    cache: Vec<Matrix>,
}

/// Activations of every layer for one forward pass, input first.
///
/// Owned by the caller, so independent passes never share state.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardPass {
    activations: Vec<Matrix>,
}

impl ForwardPass {
    pub fn activations(&self) -> &[Matrix] {
        &self.activations
    }

    /// The softmax distribution produced by the last layer.
    pub fn output(&self) -> &Matrix {
        // A pass always holds at least the input and one layer output.
        &self.activations[self.activations.len() - 1]
    }

    pub fn into_output(mut self) -> Matrix {
        self.activations.pop().unwrap_or_default()
    }
}

/// Classification accuracy over a labelled set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub correct: usize,
    pub total: usize,
}

impl Evaluation {
    /// Fraction in `[0, 1]`; zero for an empty set.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

impl Network {
    /// Builds a network with weights and biases drawn from `rng`.
    pub fn new<R: Rng + ?Sized>(
        layer_sizes: &[usize],
        hidden: ActivationFunction,
        rng: &mut R,
    ) -> Result<Network> {
        Network::from_spec(&NetworkSpec::new(layer_sizes.to_vec(), hidden), rng)
    }

    /// Same as [`Network::new`] with a reproducible `StdRng`.
    pub fn with_seed(layer_sizes: &[usize], hidden: ActivationFunction, seed: u64) -> Result<Network> {
        Network::new(layer_sizes, hidden, &mut StdRng::seed_from_u64(seed))
    }

    pub fn from_spec<R: Rng + ?Sized>(spec: &NetworkSpec, rng: &mut R) -> Result<Network> {
        spec.validate()?;
        let layers = spec
            .layer_sizes
            .windows(2)
            .enumerate()
            .map(|(i, pair)| Layer::new(pair[0], pair[1], spec.activation_for(i), rng))
            .collect();
        Ok(Network {
            layer_sizes: spec.layer_sizes.clone(),
            layers,
            cache: Vec::new(),
        })
    }

    /// Assembles a network from explicit parameters, checking every shape
    /// against `layer_sizes`.
    pub fn from_parts(
        layer_sizes: &[usize],
        weights: Vec<Matrix>,
        biases: Vec<Matrix>,
        hidden: ActivationFunction,
    ) -> Result<Network> {
        let spec = NetworkSpec::new(layer_sizes.to_vec(), hidden);
        spec.validate()?;
        if weights.len() != layer_sizes.len() - 1 || biases.len() != weights.len() {
            return Err(NnError::InvalidArchitecture(format!(
                "{} layer sizes need {} weight/bias pairs, got {} weights and {} biases",
                layer_sizes.len(),
                layer_sizes.len() - 1,
                weights.len(),
                biases.len()
            )));
        }
        let layers = weights
            .into_iter()
            .zip(biases)
            .enumerate()
            .map(|(i, (w, b))| Layer::from_parts(w, b, spec.activation_for(i)))
            .collect::<Result<Vec<_>>>()?;
        Network::from_layers(spec.layer_sizes, layers)
    }

    /// Validates that `layers` chain together and match `layer_sizes`.
    pub(crate) fn from_layers(layer_sizes: Vec<usize>, layers: Vec<Layer>) -> Result<Network> {
        if layer_sizes.len() < 2 || layers.len() != layer_sizes.len() - 1 {
            return Err(NnError::InvalidArchitecture(format!(
                "{} layer sizes do not match {} weight layers",
                layer_sizes.len(),
                layers.len()
            )));
        }
        for (i, layer) in layers.iter().enumerate() {
            let expected = (layer_sizes[i], layer_sizes[i + 1]);
            if layer.weights().shape() != expected || layer.biases().shape() != (1, expected.1) {
                return Err(NnError::InvalidArchitecture(format!(
                    "layer {} has weights {:?} and biases {:?}, expected {:?} and {:?}",
                    i,
                    layer.weights().shape(),
                    layer.biases().shape(),
                    expected,
                    (1, expected.1)
                )));
            }
            let last = i + 1 == layers.len();
            if last != (layer.activation() == ActivationFunction::Softmax) {
                return Err(NnError::InvalidArchitecture(format!(
                    "layer {} uses {}; only the output layer may (and must) use softmax",
                    i,
                    layer.activation()
                )));
            }
        }
        Ok(Network { layer_sizes, layers, cache: Vec::new() })
    }

    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn weights(&self) -> impl Iterator<Item = &Matrix> + '_ {
        self.layers.iter().map(Layer::weights)
    }

    pub fn biases(&self) -> impl Iterator<Item = &Matrix> + '_ {
        self.layers.iter().map(Layer::biases)
    }

    pub fn input_size(&self) -> usize {
        self.layer_sizes[0]
    }

    pub fn output_size(&self) -> usize {
        self.layer_sizes[self.layer_sizes.len() - 1]
    }

    /// The activation shared by all hidden layers (ReLU when there are none).
    pub fn hidden_activation(&self) -> ActivationFunction {
        self.layers
            .iter()
            .map(Layer::activation)
            .find(ActivationFunction::is_hidden)
            .unwrap_or_default()
    }

    pub fn spec(&self) -> NetworkSpec {
        NetworkSpec::new(self.layer_sizes.clone(), self.hidden_activation())
    }

    /// Activations recorded by the most recent `feed_forward` or
    /// `back_propagate` on this instance; empty before the first call.
    pub fn cached_activations(&self) -> &[Matrix] {
        &self.cache
    }

    /// Forward pass into a caller-owned cache. Safe to run from many threads
    /// at once.
    pub fn forward(&self, input: &Matrix) -> Result<ForwardPass> {
        if input.shape() != (1, self.input_size()) {
            return Err(NnError::DimensionMismatch {
                op: "feed_forward",
                left: input.shape(),
                right: (1, self.input_size()),
            });
        }
        let mut activations = Vec::with_capacity(self.layer_sizes.len());
        activations.push(input.clone());
        for layer in &self.layers {
            let next = layer.feed_from(&activations[activations.len() - 1])?;
            activations.push(next);
        }
        Ok(ForwardPass { activations })
    }

    /// Forward pass that also keeps the per-layer activations on `self`.
    pub fn feed_forward(&mut self, input: &Matrix) -> Result<Matrix> {
        let pass = self.forward(input)?;
        let output = pass.output().clone();
        self.cache = pass.activations;
        Ok(output)
    }

    pub fn predict(&self, input: &Matrix) -> Result<Matrix> {
        Ok(self.forward(input)?.into_output())
    }

    /// Index of the most probable class.
    pub fn classify(&self, input: &Matrix) -> Result<usize> {
        Ok(self.predict(input)?.argmax())
    }

    /// Forward and backward pass for one `(input, one-hot target)` pair.
    pub fn compute_gradients(&self, input: &Matrix, target: &Matrix) -> Result<Gradients> {
        let pass = self.forward(input)?;
        self.backward(&pass, target)
    }

    fn backward(&self, pass: &ForwardPass, target: &Matrix) -> Result<Gradients> {
        let cache = pass.activations();
        let loss = CrossEntropyLoss::loss(pass.output(), target)?;
        let mut delta = CrossEntropyLoss::derivative(pass.output(), target)?;

        let n = self.layers.len();
        let mut weights = Vec::with_capacity(n);
        let mut biases = Vec::with_capacity(n);
        for l in (0..n).rev() {
            let layer = &self.layers[l];
            let (w_grad, b_grad) = layer.compute_gradients(&cache[l], &delta)?;
            if l > 0 {
                // cache[l] was produced by layer l - 1, so its tag picks the derivative.
                let upstream = self.layers[l - 1].activation();
                delta = layer
                    .back_through(&delta)?
                    .hadamard(&upstream.derivative(&cache[l]))?;
            }
            weights.push(w_grad);
            biases.push(b_grad);
        }
        weights.reverse();
        biases.reverse();
        Ok(Gradients::new(weights, biases, loss))
    }

    /// `params -= scale * grads` for every layer. Nothing is modified if any
    /// gradient has the wrong shape.
    pub fn apply_gradients(&mut self, grads: &Gradients, scale: f64) -> Result<()> {
        if grads.weights().len() != self.layers.len() || grads.biases().len() != self.layers.len() {
            return Err(NnError::InvalidArchitecture(format!(
                "gradients cover {} layers, network has {}",
                grads.weights().len(),
                self.layers.len()
            )));
        }
        for ((layer, w), b) in self.layers.iter().zip(grads.weights()).zip(grads.biases()) {
            layer.check_gradients(w, b)?;
        }
        for ((layer, w), b) in self.layers.iter_mut().zip(grads.weights()).zip(grads.biases()) {
            layer.apply_gradients(w, b, scale)?;
        }
        Ok(())
    }

    /// One stochastic gradient descent step on a single sample.
    ///
    /// Returns the sample's cross-entropy loss before the update.
    pub fn back_propagate(&mut self, input: &Matrix, target: &Matrix, learning_rate: f64) -> Result<f64> {
        let pass = self.forward(input)?;
        let grads = self.backward(&pass, target)?;
        self.cache = pass.activations;
        self.apply_gradients(&grads, learning_rate)?;
        Ok(grads.loss())
    }

    /// One gradient descent step using the mean gradient over a batch.
    ///
    /// Per-sample gradients are computed in parallel against the current,
    /// read-only parameters; every worker sums into its own accumulator and
    /// the partial sums are merged pairwise before the single update.
    /// Returns the mean cross-entropy loss of the batch before the update.
    pub fn back_propagate_batch(
        &mut self,
        inputs: &[Matrix],
        targets: &[Matrix],
        learning_rate: f64,
    ) -> Result<f64> {
        if inputs.len() != targets.len() {
            return Err(NnError::SizeMismatch { inputs: inputs.len(), targets: targets.len() });
        }
        if inputs.is_empty() {
            return Err(NnError::EmptyBatch);
        }

        let network = &*self;
        let total = inputs
            .par_iter()
            .zip(targets.par_iter())
            .try_fold(
                || Gradients::zeros_like(network),
                |mut acc: Gradients, (input, target)| -> Result<Gradients> {
                    acc.accumulate(&network.compute_gradients(input, target)?)?;
                    Ok(acc)
                },
            )
            .try_reduce(
                || Gradients::zeros_like(network),
                |mut left: Gradients, right: Gradients| {
                    left.accumulate(&right)?;
                    Ok(left)
                },
            )?;

        let batch_size = inputs.len() as f64;
        debug!("batch of {} samples, summed loss {:.6}", total.samples(), total.loss());
        self.apply_gradients(&total, learning_rate / batch_size)?;
        Ok(total.loss() / batch_size)
    }

    /// Classifies every input in parallel and counts matches with `labels`.
    pub fn evaluate(&self, inputs: &[Matrix], labels: &[u8]) -> Result<Evaluation> {
        if inputs.len() != labels.len() {
            return Err(NnError::SizeMismatch { inputs: inputs.len(), targets: labels.len() });
        }
        let correct = inputs
            .par_iter()
            .zip(labels.par_iter())
            .map(|(input, &label)| -> Result<usize> {
                Ok(usize::from(self.classify(input)? == label as usize))
            })
            .try_reduce(|| 0, |a, b| Ok(a + b))?;
        Ok(Evaluation { correct, total: inputs.len() })
    }
}
