//! Seeded workload generation.
//!
//! A workload is `t_max` batches of interactions. Interactions in one batch
//! share a timestamp and model simultaneous attempts. Each agent attempts
//! with probability `lambda` per step: an agent that holds nothing acquires a
//! random resource, otherwise it releases what it holds. Held state is
//! tracked optimistically and ignores rejections, so agents keep trying to
//! release locks they never got.
//!
//! With `force_global_conflict`, acquisitions lean towards the hotspot and
//! every [`CONFLICT_PERIOD`]th step also carries [`CONFLICT_BURST`]: three
//! agents grabbing the two default `C_global` resources at once.
//!
//! Generation is deterministic for a given configuration and seed, so every
//! mechanism under comparison sees exactly the same attempts.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracegate_proto::{AgentId, Interaction, ResourceId};

/// Interactions attempted at one timestep.
pub type Batch = Vec<Interaction>;

/// Steps between injected conflict bursts (starting at step 0).
pub const CONFLICT_PERIOD: u64 = 10;

/// Acquisitions `(agent, resource)` injected at each conflict step.
///
/// Two holders already fill `{r1, r2}` under `K_max = 2`; the third attempt
/// breaks the bound (and `C_excl` on `r1`).
pub const CONFLICT_BURST: [(&str, &str); 3] = [("a1", "r1"), ("a2", "r2"), ("a3", "r1")];

/// Workload parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Participating agents
    pub agents: Vec<AgentId>,
    /// Target resources
    pub resources: Vec<ResourceId>,
    /// Number of timesteps
    pub t_max: u64,
    /// Per-agent attempt probability per timestep
    pub lambda: f64,
    /// RNG seed
    pub seed: u64,
    /// Bias acquisitions towards `hotspot` to stress the global bound
    pub force_global_conflict: bool,
    /// Resources favored when `force_global_conflict` is set
    pub hotspot: Vec<ResourceId>,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self::new(5, 3)
    }
}

impl WorkloadConfig {
    /// Agents `a1..an`, resources `r1..rm`, 50 steps at `lambda = 0.5`.
    pub fn new(num_agents: usize, num_resources: usize) -> Self {
        Self {
            agents: (1..=num_agents).map(|i| format!("a{i}")).collect(),
            resources: (1..=num_resources).map(|i| format!("r{i}")).collect(),
            t_max: 50,
            lambda: 0.5,
            seed: 0,
            force_global_conflict: false,
            hotspot: vec!["r1".to_string(), "r2".to_string()],
        }
    }

    /// Set the attempt probability.
    #[must_use]
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    /// Set the number of timesteps.
    #[must_use]
    pub fn with_t_max(mut self, t_max: u64) -> Self {
        self.t_max = t_max;
        self
    }

    /// Set the seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enable the hotspot bias.
    #[must_use]
    pub fn with_global_conflict(mut self, enabled: bool) -> Self {
        self.force_global_conflict = enabled;
        self
    }
}

/// Generate `t_max` batches from `config`.
pub fn generate_interactions(config: &WorkloadConfig) -> Vec<Batch> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut held: BTreeMap<&str, Option<ResourceId>> =
        config.agents.iter().map(|a| (a.as_str(), None)).collect();

    let mut batches = Vec::with_capacity(config.t_max as usize);
    for t in 0..config.t_max {
        let mut batch = Batch::new();
        for agent in &config.agents {
            if rng.gen_range(0.0..1.0) >= config.lambda {
                continue;
            }
            match held.get(agent.as_str()).cloned().flatten() {
                Some(resource) => batch.push(Interaction::release(agent.as_str(), resource, t)),
                None => {
                    if let Some(resource) = pick_resource(&mut rng, config) {
                        batch.push(Interaction::acquire(agent.as_str(), resource, t));
                    }
                },
            }
        }
        if config.force_global_conflict && t % CONFLICT_PERIOD == 0 {
            inject_conflict(&mut batch, config, t);
        }

        for interaction in &batch {
            if let Some(slot) = held.get_mut(interaction.agent()) {
                *slot = interaction.is_acquire().then(|| interaction.resource().to_owned());
            }
        }
        batches.push(batch);
    }
    batches
}

/// Append the members of [`CONFLICT_BURST`] whose agent and resource exist.
fn inject_conflict(batch: &mut Batch, config: &WorkloadConfig, t: u64) {
    let burst = CONFLICT_BURST.iter().filter(|(agent, resource)| {
        config.agents.iter().any(|a| a == agent) && config.resources.iter().any(|r| r == resource)
    });
    batch.extend(burst.map(|&(agent, resource)| Interaction::acquire(agent, resource, t)));
}

fn pick_resource<'a>(rng: &mut ChaCha8Rng, config: &'a WorkloadConfig) -> Option<&'a str> {
    let uniform = config.resources.choose(rng)?.as_str();
    if !config.force_global_conflict {
        return Some(uniform);
    }

    // Hotspot members plus one uniform pick, chosen evenly.
    let hot: Vec<&str> = config
        .hotspot
        .iter()
        .filter(|r| config.resources.contains(r))
        .map(String::as_str)
        .collect();
    if hot.is_empty() {
        return Some(uniform);
    }
    let slot = rng.gen_range(0..=hot.len());
    Some(hot.get(slot).copied().unwrap_or(uniform))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(batches: &[Batch]) -> usize {
        batches.iter().map(Vec::len).sum()
    }

    #[test]
    fn same_seed_same_workload() {
        let config = WorkloadConfig::default().with_seed(7);
        assert_eq!(generate_interactions(&config), generate_interactions(&config));

        let other = generate_interactions(&config.clone().with_seed(8));
        assert_ne!(generate_interactions(&config), other);
    }

    #[test]
    fn batches_share_their_timestep() {
        let batches = generate_interactions(&WorkloadConfig::default().with_lambda(0.9));
        assert_eq!(batches.len(), 50);
        for (t, batch) in batches.iter().enumerate() {
            assert!(batch.iter().all(|i| i.time() == t as u64));
        }
    }

    #[test]
    fn lambda_bounds_activity() {
        let silent = generate_interactions(&WorkloadConfig::default().with_lambda(0.0));
        assert_eq!(count(&silent), 0);

        let busy = generate_interactions(&WorkloadConfig::default().with_lambda(1.0));
        assert_eq!(count(&busy), 5 * 50);
    }

    #[test]
    fn agents_alternate_acquire_and_release() {
        let config = WorkloadConfig::default().with_lambda(1.0);
        let batches = generate_interactions(&config);
        for agent in &config.agents {
            let mut expect_acquire = true;
            for interaction in batches.iter().flatten().filter(|i| i.agent() == agent) {
                assert_eq!(interaction.is_acquire(), expect_acquire);
                expect_acquire = !expect_acquire;
            }
        }
    }

    #[test]
    fn releases_name_the_held_resource() {
        let batches = generate_interactions(&WorkloadConfig::default().with_seed(3));
        let mut held: BTreeMap<&str, &str> = BTreeMap::new();
        for interaction in batches.iter().flatten() {
            if interaction.is_acquire() {
                held.insert(interaction.agent(), interaction.resource());
            } else {
                assert_eq!(held.remove(interaction.agent()), Some(interaction.resource()));
            }
        }
    }

    #[test]
    fn hotspot_bias_concentrates_acquisitions() {
        let base = WorkloadConfig::new(10, 6).with_lambda(1.0).with_t_max(200);
        let hot = |config: &WorkloadConfig| {
            generate_interactions(config)
                .iter()
                .flatten()
                .filter(|i| i.is_acquire() && config.hotspot.iter().any(|r| r == i.resource()))
                .count()
        };

        let uniform = hot(&base);
        let biased = hot(&base.clone().with_global_conflict(true));
        assert!(biased > uniform, "biased {biased} <= uniform {uniform}");
    }

    #[test]
    fn hotspot_outside_the_resources_is_ignored() {
        let config = WorkloadConfig::new(4, 1).with_lambda(1.0).with_global_conflict(true);
        let batches = generate_interactions(&config);
        assert!(batches.iter().flatten().all(|i| i.resource() == "r1"));
    }

    #[test]
    fn conflict_burst_lands_on_every_tenth_step() {
        let config = WorkloadConfig::new(5, 3)
            .with_lambda(0.0)
            .with_t_max(35)
            .with_global_conflict(true);

        for (t, batch) in generate_interactions(&config).iter().enumerate() {
            let t = t as u64;
            if t % CONFLICT_PERIOD == 0 {
                let burst: Vec<Interaction> =
                    CONFLICT_BURST.iter().map(|&(a, r)| Interaction::acquire(a, r, t)).collect();
                assert_eq!(batch, &burst, "step {t}");
            } else {
                assert!(batch.is_empty(), "unexpected interactions at step {t}: {batch:?}");
            }
        }
    }

    #[test]
    fn conflict_burst_follows_random_attempts() {
        let config = WorkloadConfig::new(5, 3).with_lambda(0.8).with_global_conflict(true);
        let batches = generate_interactions(&config);
        for t in (0..batches.len()).step_by(CONFLICT_PERIOD as usize) {
            let batch = &batches[t];
            let tail: Vec<(&str, &str)> = batch[batch.len() - CONFLICT_BURST.len()..]
                .iter()
                .map(|i| (i.agent(), i.resource()))
                .collect();
            assert_eq!(tail, CONFLICT_BURST, "step {t}");
        }
    }

    #[test]
    fn no_resources_means_no_acquisitions() {
        let mut config = WorkloadConfig::default().with_lambda(1.0);
        config.resources.clear();
        assert_eq!(count(&generate_interactions(&config)), 0);
    }
}
