//! Ambient particle layer: standard rising motes, fire, snow and
//! twinkling stars.

use kurbo::{Circle, Shape};

use crate::config::{ParticleTheme, TextConfig};
use crate::render::{bezpath_to_cpu, color_from_rgba8};
use crate::rng::XorShift64;

const POP_STANDARD: usize = 150;
const POP_FIRE: usize = 150;
const POP_STARS: usize = 100;

fn population_cap(theme: ParticleTheme) -> usize {
    match theme {
        ParticleTheme::None => 0,
        ParticleTheme::Fire => POP_FIRE,
        ParticleTheme::Stars => POP_STARS,
        _ => POP_STANDARD,
    }
}

#[derive(Clone, Copy, Debug)]
struct Particle {
    x: f64,
    y: f64,
    v: f64,
    s: f64,
    life: f64,
    drift: f64,
}

/// Stateful particle population. The simulation mutates across frames by
/// design; a fixed seed plus a fixed frame cadence reproduces the same
/// sequence.
pub struct ParticleSystem {
    theme: ParticleTheme,
    particles: Vec<Particle>,
    rng: XorShift64,
}

impl ParticleSystem {
    pub fn new(seed: u64) -> Self {
        Self {
            theme: ParticleTheme::None,
            particles: Vec::new(),
            rng: XorShift64::new(seed ^ 0x70ab_91c3),
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Step the simulation one frame and draw into `ctx`.
    pub fn update_and_draw(
        &mut self,
        ctx: &mut vello_cpu::RenderContext,
        w: f64,
        h: f64,
        time: f64,
        cfg: &TextConfig,
    ) {
        let theme = cfg.particle_theme;
        if theme != self.theme {
            self.particles.clear();
            self.theme = theme;
        }
        if theme == ParticleTheme::None {
            return;
        }

        let cap = population_cap(theme);
        if self.particles.is_empty() {
            for _ in 0..cap {
                let p = self.spawn(theme, w, h, true, cfg);
                self.particles.push(p);
            }
        }
        if self.particles.len() < cap {
            let p = self.spawn(theme, w, h, false, cfg);
            self.particles.push(p);
        }

        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);

        let mut alive = Vec::with_capacity(self.particles.len());
        for mut p in self.particles.drain(..) {
            let color = match theme {
                ParticleTheme::Fire => {
                    let g = (self.rng.next_f64() * 100.0) as u8;
                    [255, g, 0, 153]
                }
                _ => cfg.particle_color,
            };

            let mut alpha = 1.0f32;
            match theme {
                ParticleTheme::Snow => {
                    p.y += p.v;
                    p.x += p.drift;
                }
                ParticleTheme::Fire => {
                    p.y -= p.v;
                    p.x += p.drift;
                    p.s *= 0.98;
                }
                ParticleTheme::Stars => {
                    alpha = (((p.life + time * 2.0).sin() + 1.0) / 2.0) as f32;
                }
                _ => {
                    p.y -= p.v;
                    p.x += p.drift;
                }
            }

            ctx.set_paint(color_from_rgba8(color));
            let dot = Circle::new((p.x, p.y), p.s.max(0.1)).to_path(0.1);
            if alpha < 1.0 {
                ctx.push_opacity_layer(alpha);
            }
            ctx.fill_path(&bezpath_to_cpu(&dot));
            if alpha < 1.0 {
                ctx.pop_layer();
            }

            let dead = match theme {
                ParticleTheme::Snow => p.y > h + 100.0,
                ParticleTheme::Fire => p.y < -100.0 || p.s < 1.0,
                ParticleTheme::Stars => false,
                _ => p.y < -100.0,
            };
            if !dead {
                alive.push(p);
            }
        }
        self.particles = alive;
    }

    fn spawn(&mut self, theme: ParticleTheme, w: f64, h: f64, random_y: bool, cfg: &TextConfig) -> Particle {
        let v_mult = cfg.particle_speed;
        let s_mult = cfg.particle_size;
        let rng = &mut self.rng;

        let mut p = Particle {
            x: rng.next_f64() * w,
            y: if random_y {
                rng.next_f64() * h
            } else if theme == ParticleTheme::Snow {
                -20.0
            } else {
                h + 20.0
            },
            v: (2.0 + rng.next_f64() * 3.0) * v_mult,
            s: (4.0 + rng.next_f64() * 8.0) * s_mult,
            life: 1.0 + rng.next_f64(),
            drift: (rng.next_f64() - 0.5) * 2.0,
        };

        match theme {
            ParticleTheme::Fire => {
                p.x = w / 2.0 + (rng.next_f64() - 0.5) * w * 0.6;
                p.v = (4.0 + rng.next_f64() * 5.0) * v_mult;
                p.s = (10.0 + rng.next_f64() * 20.0) * s_mult;
            }
            ParticleTheme::Stars => {
                p.y = rng.next_f64() * h;
                p.v = 0.2 * v_mult;
                p.s = (2.0 + rng.next_f64() * 5.0) * s_mult;
                p.life = rng.next_f64() * std::f64::consts::PI;
            }
            _ => {}
        }
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TextConfig;

    fn ctx() -> vello_cpu::RenderContext {
        vello_cpu::RenderContext::new(64, 64)
    }

    fn cfg_with(theme: ParticleTheme) -> TextConfig {
        TextConfig {
            particle_theme: theme,
            ..TextConfig::default()
        }
    }

    #[test]
    fn first_frame_fills_the_population() {
        let mut ps = ParticleSystem::new(1);
        ps.update_and_draw(&mut ctx(), 64.0, 64.0, 0.0, &cfg_with(ParticleTheme::Standard));
        assert_eq!(ps.len(), POP_STANDARD);
    }

    #[test]
    fn stars_cap_at_their_own_population() {
        let mut ps = ParticleSystem::new(1);
        ps.update_and_draw(&mut ctx(), 64.0, 64.0, 0.0, &cfg_with(ParticleTheme::Stars));
        assert_eq!(ps.len(), POP_STARS);
    }

    #[test]
    fn theme_switch_clears_population() {
        let mut ps = ParticleSystem::new(1);
        ps.update_and_draw(&mut ctx(), 64.0, 64.0, 0.0, &cfg_with(ParticleTheme::Standard));
        assert_eq!(ps.len(), POP_STANDARD);
        ps.update_and_draw(&mut ctx(), 64.0, 64.0, 0.1, &cfg_with(ParticleTheme::Stars));
        assert_eq!(ps.len(), POP_STARS);
    }

    #[test]
    fn none_theme_draws_nothing() {
        let mut ps = ParticleSystem::new(1);
        ps.update_and_draw(&mut ctx(), 64.0, 64.0, 0.0, &cfg_with(ParticleTheme::None));
        assert!(ps.is_empty());
    }

    #[test]
    fn same_seed_same_population() {
        let cfg = cfg_with(ParticleTheme::Snow);
        let mut a = ParticleSystem::new(9);
        let mut b = ParticleSystem::new(9);
        for i in 0..5 {
            let t = i as f64 / 30.0;
            a.update_and_draw(&mut ctx(), 64.0, 64.0, t, &cfg);
            b.update_and_draw(&mut ctx(), 64.0, 64.0, t, &cfg);
        }
        assert_eq!(a.len(), b.len());
        for (pa, pb) in a.particles.iter().zip(&b.particles) {
            assert_eq!(pa.x, pb.x);
            assert_eq!(pa.y, pb.y);
        }
    }
}
