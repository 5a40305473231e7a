//! Core flocking kernel shared across the boidsim workspace.
//!
//! One tick is a pure transformation `(Population, FlockConfig) -> Population`:
//! all-pairs distances are computed once, the three classical force rules
//! (separation, alignment, cohesion) each produce a magnitude-limited force
//! field, the weighted sum is integrated, and the boundary policy maps the
//! result back into the world rectangle. Every read within a tick is against
//! the frozen previous-tick state, so the per-agent passes parallelize without
//! changing the result.

use rand::{Rng, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};
use thiserror::Error;

/// Stabilizing epsilon added to denominators before dividing by a distance
/// or a vector magnitude, so coincident agents and zero vectors stay finite.
pub const NORM_EPSILON: f32 = 1e-8;

/// Lower bound of the speed range sampled for freshly initialized agents.
const MIN_INITIAL_SPEED: f32 = 0.5;

/// Errors raised while constructing simulation state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FlockError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Position and velocity columns must always describe the same agents.
    #[error("positions and velocities differ in length ({positions} vs {velocities})")]
    MismatchedColumns { positions: usize, velocities: usize },
    /// A population was supplied whose size disagrees with the configuration.
    #[error("population holds {actual} agents but the configuration expects {expected}")]
    PopulationSize { expected: usize, actual: usize },
}

/// Monotonic tick counter.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Tick zero, the state before the first step.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// The tick following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Plain 2D vector used for positions, velocities, and forces.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    /// The zero vector.
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Squared Euclidean length.
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    /// Scale the vector down (never up) so its magnitude does not exceed
    /// `max_magnitude`. The scale factor is `min(1, max / (|v| + epsilon))`.
    #[must_use]
    pub fn limited(self, max_magnitude: f32) -> Self {
        let scale = (max_magnitude / (self.length() + NORM_EPSILON)).min(1.0);
        self * scale
    }

    /// Whether both components are finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f32> for Vec2 {
    type Output = Self;

    fn div(self, rhs: f32) -> Self {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Vec2 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

/// Boundary policy applied after integration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EdgeMode {
    /// Toroidal world: coordinates are reduced modulo the world dimensions.
    #[default]
    Wrap,
    /// Elastic reflection: the violated axis's velocity component flips sign
    /// and the position is clamped back into the world rectangle.
    Bounce,
}

/// Static configuration for a flocking run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlockConfig {
    /// Number of agents, fixed for the lifetime of the run.
    pub num_boids: usize,
    /// Integration time step in simulated seconds.
    pub dt: f32,
    /// Width of the world rectangle in world units.
    pub world_width: f32,
    /// Height of the world rectangle in world units.
    pub world_height: f32,
    /// Upper bound on agent speed after integration.
    pub max_speed: f32,
    /// Upper bound on the magnitude of each individual force rule's output.
    pub max_force: f32,
    /// Perception radius for the separation rule.
    pub separation_radius: f32,
    /// Perception radius for the alignment rule.
    pub alignment_radius: f32,
    /// Perception radius for the cohesion rule.
    pub cohesion_radius: f32,
    /// Weight applied to the limited separation force.
    pub separation_weight: f32,
    /// Weight applied to the limited alignment force.
    pub alignment_weight: f32,
    /// Weight applied to the limited cohesion force.
    pub cohesion_weight: f32,
    /// Boundary policy for agents leaving the world rectangle.
    pub edge_mode: EdgeMode,
    /// When set, agents with zero alignment/cohesion neighbors receive the
    /// zero force instead of the historical floor-at-1 average, which pulls
    /// an isolated agent toward zero velocity and toward the origin.
    pub isolated_zero_force: bool,
}

impl Default for FlockConfig {
    fn default() -> Self {
        Self {
            num_boids: 200,
            dt: 0.02,
            world_width: 100.0,
            world_height: 100.0,
            max_speed: 2.0,
            max_force: 0.03,
            separation_radius: 3.0,
            alignment_radius: 5.0,
            cohesion_radius: 5.0,
            separation_weight: 1.5,
            alignment_weight: 1.0,
            cohesion_weight: 1.0,
            edge_mode: EdgeMode::Wrap,
            isolated_zero_force: false,
        }
    }
}

impl FlockConfig {
    /// Validates the configuration, failing fast on values that would
    /// otherwise surface mid-simulation as NaN propagation.
    pub fn validate(&self) -> Result<(), FlockError> {
        if self.num_boids == 0 {
            return Err(FlockError::InvalidConfig("num_boids must be at least 1"));
        }
        if !self.world_width.is_finite()
            || !self.world_height.is_finite()
            || self.world_width <= 0.0
            || self.world_height <= 0.0
        {
            return Err(FlockError::InvalidConfig(
                "world dimensions must be positive and finite",
            ));
        }
        if !self.dt.is_finite() || self.dt < 0.0 {
            return Err(FlockError::InvalidConfig("dt must be non-negative"));
        }
        if !self.max_speed.is_finite()
            || !self.max_force.is_finite()
            || self.max_speed < 0.0
            || self.max_force < 0.0
        {
            return Err(FlockError::InvalidConfig(
                "speed and force limits must be non-negative",
            ));
        }
        if !self.separation_radius.is_finite()
            || !self.alignment_radius.is_finite()
            || !self.cohesion_radius.is_finite()
            || self.separation_radius < 0.0
            || self.alignment_radius < 0.0
            || self.cohesion_radius < 0.0
        {
            return Err(FlockError::InvalidConfig(
                "perception radii must be non-negative",
            ));
        }
        if !self.separation_weight.is_finite()
            || !self.alignment_weight.is_finite()
            || !self.cohesion_weight.is_finite()
            || self.separation_weight < 0.0
            || self.alignment_weight < 0.0
            || self.cohesion_weight < 0.0
        {
            return Err(FlockError::InvalidConfig(
                "rule weights must be non-negative",
            ));
        }
        Ok(())
    }
}

/// Parallel position/velocity columns describing every agent for one tick.
///
/// A population is replaced wholesale by [`step`]; it is never mutated in
/// place, which keeps tick outputs comparable in tests and safe to inspect
/// from a rendering layer between ticks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Population {
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
}

impl Population {
    /// Build a population from matching position and velocity columns.
    pub fn new(positions: Vec<Vec2>, velocities: Vec<Vec2>) -> Result<Self, FlockError> {
        if positions.len() != velocities.len() {
            return Err(FlockError::MismatchedColumns {
                positions: positions.len(),
                velocities: velocities.len(),
            });
        }
        Ok(Self {
            positions,
            velocities,
        })
    }

    /// Number of agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true when no agents are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Immutable access to agent positions.
    #[must_use]
    pub fn positions(&self) -> &[Vec2] {
        &self.positions
    }

    /// Immutable access to agent velocities.
    #[must_use]
    pub fn velocities(&self) -> &[Vec2] {
        &self.velocities
    }

    /// Whether every coordinate and velocity component is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.positions.iter().all(|p| p.is_finite())
            && self.velocities.iter().all(|v| v.is_finite())
    }
}

/// Dense N x N matrix of pairwise Euclidean distances, row-major.
///
/// Symmetric with an exact-zero diagonal. Computed once per tick and shared
/// by all three force rules.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    n: usize,
    values: Vec<f32>,
}

impl DistanceMatrix {
    /// Compute all pairwise distances for `positions`. Rows are independent,
    /// so they are filled in parallel without affecting the result.
    #[must_use]
    pub fn compute(positions: &[Vec2]) -> Self {
        let n = positions.len();
        let mut values = vec![0.0f32; n * n];
        values
            .par_chunks_mut(n.max(1))
            .enumerate()
            .for_each(|(i, row)| {
                let origin = positions[i];
                for (j, slot) in row.iter_mut().enumerate() {
                    *slot = (origin - positions[j]).length();
                }
            });
        Self { n, values }
    }

    /// Number of agents the matrix covers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.n
    }

    /// Returns true for the empty matrix.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Distance between agents `i` and `j`, if both are in range.
    #[must_use]
    pub fn get(&self, i: usize, j: usize) -> Option<f32> {
        if i < self.n && j < self.n {
            Some(self.values[i * self.n + j])
        } else {
            None
        }
    }

    /// Row of distances from agent `i` to every agent.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.values[i * self.n..(i + 1) * self.n]
    }
}

/// Separation: inverse-distance-weighted repulsion away from every neighbor
/// closer than `separation_radius`. Agents with no qualifying neighbor
/// receive the zero vector.
#[must_use]
pub fn separation_force(
    positions: &[Vec2],
    distances: &DistanceMatrix,
    config: &FlockConfig,
) -> Vec<Vec2> {
    let radius = config.separation_radius;
    positions
        .par_iter()
        .enumerate()
        .map(|(i, &origin)| {
            let mut force = Vec2::ZERO;
            for (j, &dist) in distances.row(i).iter().enumerate() {
                if dist > 0.0 && dist < radius {
                    force += (origin - positions[j]) / (dist + NORM_EPSILON);
                }
            }
            force
        })
        .collect()
}

/// Alignment: mean neighbor velocity within `alignment_radius` minus the
/// agent's own velocity. The neighbor count is floored at 1 before dividing,
/// so an isolated agent is pulled toward zero velocity unless
/// [`FlockConfig::isolated_zero_force`] is set.
#[must_use]
pub fn alignment_force(
    velocities: &[Vec2],
    distances: &DistanceMatrix,
    config: &FlockConfig,
) -> Vec<Vec2> {
    let radius = config.alignment_radius;
    velocities
        .par_iter()
        .enumerate()
        .map(|(i, &own)| {
            let mut sum = Vec2::ZERO;
            let mut count = 0usize;
            for (j, &dist) in distances.row(i).iter().enumerate() {
                if dist > 0.0 && dist < radius {
                    sum += velocities[j];
                    count += 1;
                }
            }
            if count == 0 && config.isolated_zero_force {
                Vec2::ZERO
            } else {
                sum / (count.max(1) as f32) - own
            }
        })
        .collect()
}

/// Cohesion: mean neighbor position within `cohesion_radius` minus the
/// agent's own position, with the same floor-at-1 neighbor count as
/// [`alignment_force`]. An isolated agent is pulled toward the origin unless
/// [`FlockConfig::isolated_zero_force`] is set.
#[must_use]
pub fn cohesion_force(
    positions: &[Vec2],
    distances: &DistanceMatrix,
    config: &FlockConfig,
) -> Vec<Vec2> {
    let radius = config.cohesion_radius;
    positions
        .par_iter()
        .enumerate()
        .map(|(i, &own)| {
            let mut sum = Vec2::ZERO;
            let mut count = 0usize;
            for (j, &dist) in distances.row(i).iter().enumerate() {
                if dist > 0.0 && dist < radius {
                    sum += positions[j];
                    count += 1;
                }
            }
            if count == 0 && config.isolated_zero_force {
                Vec2::ZERO
            } else {
                sum / (count.max(1) as f32) - own
            }
        })
        .collect()
}

/// Clamp each vector in `field` so its magnitude does not exceed
/// `max_magnitude`. Vectors already within the bound pass through unchanged.
pub fn limit_magnitude(field: &mut [Vec2], max_magnitude: f32) {
    for vector in field.iter_mut() {
        *vector = vector.limited(max_magnitude);
    }
}

/// Apply the configured boundary policy to freshly integrated positions.
///
/// Wrap reduces each coordinate into `[0, dim)` and leaves velocity alone.
/// Bounce flips the velocity component of each axis whose position is
/// strictly below zero or strictly above the dimension, then clamps the
/// position into `[0, dim]`; a position landing exactly on the boundary does
/// not trigger a flip.
pub fn apply_edges(positions: &mut [Vec2], velocities: &mut [Vec2], config: &FlockConfig) {
    let width = config.world_width;
    let height = config.world_height;
    match config.edge_mode {
        EdgeMode::Wrap => {
            for position in positions.iter_mut() {
                position.x = position.x.rem_euclid(width);
                position.y = position.y.rem_euclid(height);
            }
        }
        EdgeMode::Bounce => {
            for (position, velocity) in positions.iter_mut().zip(velocities.iter_mut()) {
                if position.x < 0.0 || position.x > width {
                    velocity.x = -velocity.x;
                    position.x = position.x.clamp(0.0, width);
                }
                if position.y < 0.0 || position.y > height {
                    velocity.y = -velocity.y;
                    position.y = position.y.clamp(0.0, height);
                }
            }
        }
    }
}

/// Advance the population by one tick.
///
/// Deterministic and pure: the same population and configuration always
/// produce the bit-identical successor, and the input population is left
/// untouched. The caller is responsible for supplying a validated
/// configuration; see [`FlockConfig::validate`].
#[must_use]
pub fn step(population: &Population, config: &FlockConfig) -> Population {
    debug_assert!(config.validate().is_ok());
    let positions = population.positions();
    let velocities = population.velocities();

    let distances = DistanceMatrix::compute(positions);

    let mut separation = separation_force(positions, &distances, config);
    let mut alignment = alignment_force(velocities, &distances, config);
    let mut cohesion = cohesion_force(positions, &distances, config);
    limit_magnitude(&mut separation, config.max_force);
    limit_magnitude(&mut alignment, config.max_force);
    limit_magnitude(&mut cohesion, config.max_force);

    let mut next_velocities: Vec<Vec2> = velocities
        .iter()
        .enumerate()
        .map(|(i, &velocity)| {
            let total = separation[i] * config.separation_weight
                + alignment[i] * config.alignment_weight
                + cohesion[i] * config.cohesion_weight;
            (velocity + total).limited(config.max_speed)
        })
        .collect();

    let mut next_positions: Vec<Vec2> = positions
        .iter()
        .zip(next_velocities.iter())
        .map(|(&position, &velocity)| position + velocity * config.dt)
        .collect();

    apply_edges(&mut next_positions, &mut next_velocities, config);

    Population {
        positions: next_positions,
        velocities: next_velocities,
    }
}

/// Produce a starting population with uniformly random positions inside the
/// world rectangle and velocities with uniform heading and a speed drawn
/// from `[min(0.5, max_speed), max_speed]`.
pub fn initialize(seed: u64, config: &FlockConfig) -> Result<Population, FlockError> {
    config.validate()?;
    let mut rng = SmallRng::seed_from_u64(seed);

    let mut positions = Vec::with_capacity(config.num_boids);
    for _ in 0..config.num_boids {
        positions.push(Vec2::new(
            rng.random_range(0.0..config.world_width),
            rng.random_range(0.0..config.world_height),
        ));
    }

    let min_speed = MIN_INITIAL_SPEED.min(config.max_speed);
    let mut velocities = Vec::with_capacity(config.num_boids);
    for _ in 0..config.num_boids {
        let angle = rng.random_range(0.0..std::f32::consts::TAU);
        let speed = rng.random_range(min_speed..=config.max_speed);
        velocities.push(Vec2::new(angle.cos(), angle.sin()) * speed);
    }

    Ok(Population {
        positions,
        velocities,
    })
}

/// Per-tick derived metrics for logging and inspection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FlockSummary {
    pub tick: Tick,
    pub agent_count: usize,
    pub mean_speed: f32,
    pub center: Vec2,
}

/// Stateful wrapper owning a configuration and the current population.
///
/// Consumers that want the raw kernel call [`step`] directly; this type adds
/// the tick counter and wholesale population replacement a driving loop
/// needs.
#[derive(Debug, Clone)]
pub struct Simulation {
    config: FlockConfig,
    population: Population,
    tick: Tick,
}

impl Simulation {
    /// Build a simulation with a freshly initialized random population.
    pub fn new(seed: u64, config: FlockConfig) -> Result<Self, FlockError> {
        let population = initialize(seed, &config)?;
        Ok(Self {
            config,
            population,
            tick: Tick::zero(),
        })
    }

    /// Build a simulation around an externally supplied population.
    pub fn with_population(
        config: FlockConfig,
        population: Population,
    ) -> Result<Self, FlockError> {
        config.validate()?;
        if population.len() != config.num_boids {
            return Err(FlockError::PopulationSize {
                expected: config.num_boids,
                actual: population.len(),
            });
        }
        Ok(Self {
            config,
            population,
            tick: Tick::zero(),
        })
    }

    /// Advance one tick, replacing the population wholesale.
    pub fn step(&mut self) -> Tick {
        self.population = step(&self.population, &self.config);
        self.tick = self.tick.next();
        self.tick
    }

    /// Returns an immutable reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &FlockConfig {
        &self.config
    }

    /// Read-only view of the current population.
    #[must_use]
    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Derived metrics for the current tick.
    #[must_use]
    pub fn summary(&self) -> FlockSummary {
        let count = self.population.len();
        let mut speed_sum = 0.0f32;
        let mut center = Vec2::ZERO;
        for (&position, &velocity) in self
            .population
            .positions()
            .iter()
            .zip(self.population.velocities())
        {
            speed_sum += velocity.length();
            center += position;
        }
        let divisor = count.max(1) as f32;
        FlockSummary {
            tick: self.tick,
            agent_count: count,
            mean_speed: speed_sum / divisor,
            center: center / divisor,
        }
    }
}
