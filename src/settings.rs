use std::path::Path;

use log::warn;
use serde::Deserialize;

use crate::frag::{
    FL_KILL_DOUBLE, FL_KILL_FLASHKILL, FL_KILL_FLICKSHOT, FL_KILL_LADDERSHOT, FL_KILL_MIDAIR,
    FL_KILL_NOSCOPE, FL_KILL_PENTA, FL_KILL_QUADRO, FL_KILL_SMOKEKILL, FL_KILL_TRIPLE,
    FL_KILL_WALLBANG, MultiKillType,
};
use crate::weapon::WeaponCategory;

/// longest flick window allowed in any category, bounds the view angle history
pub const MAX_FLICKSHOT_DURATION: i32 = 300;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("could not open settings file \"{name}\"")]
    Open {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
}

macro_rules! category_settings {
    ($($field:ident: $ty:ty = $default:expr => $key:literal,)*) => {
        /// one layer of settings, every key is optional so a category
        /// only overrides what it names
        #[derive(Debug, Clone, Default, Deserialize)]
        #[serde(deny_unknown_fields)]
        pub struct CategorySettings {
            $(
                #[serde(rename = $key, default)]
                pub $field: Option<$ty>,
            )*
        }

        impl CategorySettings {
            const DEFAULTS: CategorySettings = CategorySettings {
                $( $field: Some($default), )*
            };

            fn overlay(&mut self, other: CategorySettings) {
                $(
                    if other.$field.is_some() {
                        self.$field = other.$field;
                    }
                )*
            }
        }
    };
}

category_settings! {
    dump_to_file: bool = false => "dump_to_file",
    write_output_to_demo_directory: bool = false => "write_output_to_demo_directory",
    enable_batch_processing: bool = false => "enable_batch_processing",
    tick_5ks: bool = true => "tick_5ks",
    tick_4ks: bool = true => "tick_4ks",
    tick_3ks: bool = true => "tick_3ks",
    tick_doubles: bool = true => "tick_doubles",
    tick_triples: bool = true => "tick_triples",
    tick_quadros: bool = true => "tick_quadros",
    tick_pentas: bool = true => "tick_pentas",
    tick_flash_smoke_kills: bool = true => "tick_flash_smoke_kills",
    tick_mid_air_kills: bool = true => "tick_mid_air_kills",
    tick_noscopes: bool = true => "tick_noscopes",
    tick_flickshots: bool = true => "tick_flickshots",
    tick_wallbangs: bool = true => "tick_wallbangs",
    wallbang_headshot_only: bool = true => "wallbang_headshot_only",
    wallbang_require_another_kill: bool = true => "wallbang_require_another_kill",
    wallbang_another_kill_max_delta_time: f32 = 2.0 => "wallbang_another_kill_max_delta_time",
    tick_frags_vs_bots: bool = false => "tick_frags_vs_bots",
    max_time_5k: f32 = -1.0 => "5k_max_time",
    max_time_4k: f32 = 10.0 => "4k_max_time",
    max_time_3k: f32 = 2.0 => "3k_max_time",
    tick_slow_stationary_5ks: bool = true => "tick_slow_stationary_5ks",
    tick_slow_stationary_4ks: bool = false => "tick_slow_stationary_4ks",
    tick_slow_stationary_3ks: bool = false => "tick_slow_stationary_3ks",
    slow_5k_max_range: f32 = 256.0 => "slow_5k_max_range",
    slow_4k_max_range: f32 = 100.0 => "slow_4k_max_range",
    slow_3k_max_range: f32 = 0.0 => "slow_3k_max_range",
    min_headshots_5k: i32 = 0 => "5k_min_headshots",
    min_headshots_4k: i32 = 0 => "4k_min_headshots",
    min_headshots_3k: i32 = 1 => "3k_min_headshots",
    must_include_special_kill_5k: bool = false => "5k_must_include_special_kill",
    must_include_special_kill_4k: bool = false => "4k_must_include_special_kill",
    must_include_special_kill_3k: bool = false => "3k_must_include_special_kill",
    double_min_headshots: i32 = 1 => "double_min_headshots",
    triple_min_headshots: i32 = 0 => "triple_min_headshots",
    quadro_min_headshots: i32 = 0 => "quadro_min_headshots",
    penta_min_headshots: i32 = 0 => "penta_min_headshots",
    noscope_min_distance: f32 = 1000.0 => "noscope_min_distance",
    noscope_min_distance_hs_modifier: f32 = 0.5 => "noscope_min_distance_hs_modifier",
    noscope_min_distance_wb_modifier: f32 = 0.5 => "noscope_min_distance_wb_modifier",
    mid_air_min_post_kill_air_time: f32 = 0.1 => "mid_air_min_post_kill_air_time",
    mid_air_min_distance: f32 = 1000.0 => "mid_air_min_distance",
    mid_air_min_distance_hs_modifier: f32 = 0.5 => "mid_air_min_distance_hs_modifier",
    mid_air_min_distance_wb_modifier: f32 = 0.5 => "mid_air_min_distance_wb_modifier",
    flickshot_max_duration: i32 = 150 => "flickshot_max_duration",
    flickshot_headshot_only: bool = false => "flickshot_headshot_only",
}

type Key<T> = fn(&CategorySettings) -> Option<T>;

/// the keys a multi-kill of one size is checked against
struct MultiKillKeys {
    tick: Key<bool>,
    tick_stationary: Key<bool>,
    stationary_max_range: Key<f32>,
    max_time: Key<f32>,
    min_headshots: Key<i32>,
    must_include_special_kill: Key<bool>,
}

impl MultiKillKeys {
    fn of(kind: MultiKillType) -> MultiKillKeys {
        match kind {
            MultiKillType::FiveK => MultiKillKeys {
                tick: |c| c.tick_5ks,
                tick_stationary: |c| c.tick_slow_stationary_5ks,
                stationary_max_range: |c| c.slow_5k_max_range,
                max_time: |c| c.max_time_5k,
                min_headshots: |c| c.min_headshots_5k,
                must_include_special_kill: |c| c.must_include_special_kill_5k,
            },
            MultiKillType::FourK => MultiKillKeys {
                tick: |c| c.tick_4ks,
                tick_stationary: |c| c.tick_slow_stationary_4ks,
                stationary_max_range: |c| c.slow_4k_max_range,
                max_time: |c| c.max_time_4k,
                min_headshots: |c| c.min_headshots_4k,
                must_include_special_kill: |c| c.must_include_special_kill_4k,
            },
            MultiKillType::ThreeK => MultiKillKeys {
                tick: |c| c.tick_3ks,
                tick_stationary: |c| c.tick_slow_stationary_3ks,
                stationary_max_range: |c| c.slow_3k_max_range,
                max_time: |c| c.max_time_3k,
                min_headshots: |c| c.min_headshots_3k,
                must_include_special_kill: |c| c.must_include_special_kill_3k,
            },
        }
    }
}

/// the policy store, general values with per weapon category overrides
#[derive(Debug, Clone)]
pub struct Settings {
    categories: [CategorySettings; WeaponCategory::COUNT],
    max_flickshot_duration: i32,
}

impl Default for Settings {
    fn default() -> Self {
        let mut categories: [CategorySettings; WeaponCategory::COUNT] = Default::default();
        categories[WeaponCategory::General as usize] = CategorySettings::DEFAULTS;

        let mut settings = Settings {
            categories,
            max_flickshot_duration: 0,
        };
        settings.finish();
        settings
    }
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Settings, SettingsError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Open {
            name: path.display().to_string(),
            source,
        })?;

        Self::from_toml(&text)
    }

    /// top level keys set the general category, `[rifles]` style tables
    /// override single categories and `["snipers+autosnipers"]` several at once
    pub fn from_toml(text: &str) -> Result<Settings, SettingsError> {
        let document: toml::Table = text.parse()?;
        let mut settings = Settings::default();

        for (name, value) in document {
            let toml::Value::Table(table) = value else {
                settings.apply(&[WeaponCategory::General], name, value);
                continue;
            };

            let mut categories = Vec::new();
            for part in name.split('+') {
                match WeaponCategory::from_name(part.trim()) {
                    Some(category) => categories.push(category),
                    None => warn!("invalid category \"{part}\" in settings file"),
                }
            }

            for (key, value) in table {
                settings.apply(&categories, key, value);
            }
        }

        settings.finish();
        Ok(settings)
    }

    fn apply(&mut self, categories: &[WeaponCategory], key: String, value: toml::Value) {
        let single = toml::Value::Table(toml::Table::from_iter([(key.clone(), value)]));

        let layer = match single.try_into::<CategorySettings>() {
            Ok(layer) => layer,
            Err(err) => {
                warn!("invalid key \"{key}\" in settings file: {err}");
                return;
            }
        };

        for &category in categories {
            self.categories[category as usize].overlay(layer.clone());
        }
    }

    /// caps flick windows and finds the longest one
    fn finish(&mut self) {
        self.max_flickshot_duration = 0;

        for category in &mut self.categories {
            if let Some(duration) = category.flickshot_max_duration.as_mut() {
                *duration = (*duration).min(MAX_FLICKSHOT_DURATION);
                self.max_flickshot_duration = self.max_flickshot_duration.max(*duration);
            }
        }
    }

    /// the value of `key` for `category`, falling back to the general category
    pub fn resolve<T: Default>(&self, category: WeaponCategory, key: Key<T>) -> T {
        key(&self.categories[category as usize])
            .or_else(|| key(&self.categories[WeaponCategory::General as usize]))
            .or_else(|| key(&CategorySettings::DEFAULTS))
            .unwrap_or_default()
    }

    #[inline]
    fn general<T: Default>(&self, key: Key<T>) -> T {
        self.resolve(WeaponCategory::General, key)
    }

    pub fn batch_processing_enabled(&self) -> bool {
        self.general(|c| c.enable_batch_processing)
    }

    pub fn enable_batch_processing(&mut self) {
        self.categories[WeaponCategory::General as usize].enable_batch_processing = Some(true);
    }

    pub fn disable_batch_processing(&mut self) {
        self.categories[WeaponCategory::General as usize].enable_batch_processing = Some(false);
    }

    pub fn dump_to_file_enabled(&self) -> bool {
        self.general(|c| c.dump_to_file)
    }

    pub fn write_output_to_demo_directory(&self) -> bool {
        self.general(|c| c.write_output_to_demo_directory)
    }

    pub fn tick_frags_vs_bots(&self) -> bool {
        self.general(|c| c.tick_frags_vs_bots)
    }

    /// longest flick window over all categories in milliseconds
    pub fn max_flickshot_duration(&self) -> i32 {
        self.max_flickshot_duration
    }

    pub fn flickshot_duration(&self, category: WeaponCategory) -> i32 {
        self.resolve(category, |c| c.flickshot_max_duration)
    }

    pub fn min_post_kill_air_time(&self, category: WeaponCategory) -> f32 {
        self.resolve(category, |c| c.mid_air_min_post_kill_air_time)
    }

    /// whether a 3k, 4k or 5k done in `frag_time` seconds qualifies
    pub fn should_tick_multi_kill(
        &self,
        kind: MultiKillType,
        category: WeaponCategory,
        frag_time: f32,
        farthest_distance: f32,
        headshots: i32,
        contains_special_kill: bool,
    ) -> bool {
        let keys = MultiKillKeys::of(kind);

        if !self.resolve(category, keys.tick) {
            return false;
        }

        // slow frags done without moving much are exempt from the time limit
        let stationary = self.resolve(category, keys.tick_stationary)
            && self.resolve(category, keys.stationary_max_range) >= farthest_distance;

        if !stationary {
            let max_time = self.resolve(category, keys.max_time);
            if max_time >= 0.0 && max_time < frag_time {
                return false;
            }
        }

        if category != WeaponCategory::Knife && category != WeaponCategory::Grenade {
            if headshots < self.resolve(category, keys.min_headshots) {
                return false;
            }

            if !contains_special_kill && self.resolve(category, keys.must_include_special_kill) {
                return false;
            }
        }

        true
    }

    fn wallbang_close_to_another_kill(&self, category: WeaponCategory, time_to_closest: f32) -> bool {
        if !self.resolve(category, |c| c.wallbang_require_another_kill) {
            return true;
        }

        time_to_closest <= self.resolve(category, |c| c.wallbang_another_kill_max_delta_time)
    }

    fn check_with_headshot(
        &self,
        category: WeaponCategory,
        tick: Key<bool>,
        headshot_only: Key<bool>,
        headshot: bool,
    ) -> bool {
        self.resolve(category, tick) && (!self.resolve(category, headshot_only) || headshot)
    }

    #[allow(clippy::too_many_arguments)]
    fn check_with_distance(
        &self,
        category: WeaponCategory,
        tick: Key<bool>,
        min_distance: Key<f32>,
        hs_modifier: Key<f32>,
        wb_modifier: Key<f32>,
        distance: f32,
        headshot: bool,
        wallbang: bool,
    ) -> bool {
        if !self.resolve(category, tick) {
            return false;
        }

        let mut min = self.resolve(category, min_distance);
        if headshot {
            min *= self.resolve(category, hs_modifier);
        }
        if wallbang {
            min *= self.resolve(category, wb_modifier);
        }

        distance >= min
    }

    fn check_collat(
        &self,
        category: WeaponCategory,
        tick: Key<bool>,
        min_headshots: Key<i32>,
        headshots: i32,
    ) -> bool {
        if category == WeaponCategory::Grenade {
            return self.resolve(category, tick);
        }

        self.resolve(category, tick) && self.resolve(category, min_headshots) <= headshots
    }

    /// whether any of the frag types in `type_flags` qualifies on its own
    pub fn should_tick_frag(
        &self,
        type_flags: u16,
        category: WeaponCategory,
        distance: f32,
        headshots: i32,
        time_to_closest_kill: f32,
    ) -> bool {
        let headshot = headshots > 0;
        let wallbang = type_flags & FL_KILL_WALLBANG != 0;

        if type_flags & FL_KILL_DOUBLE != 0
            && self.check_collat(category, |c| c.tick_doubles, |c| c.double_min_headshots, headshots)
        {
            return true;
        }

        if type_flags & FL_KILL_TRIPLE != 0
            && self.check_collat(category, |c| c.tick_triples, |c| c.triple_min_headshots, headshots)
        {
            return true;
        }

        if type_flags & FL_KILL_QUADRO != 0
            && self.check_collat(category, |c| c.tick_quadros, |c| c.quadro_min_headshots, headshots)
        {
            return true;
        }

        if type_flags & FL_KILL_PENTA != 0
            && self.check_collat(category, |c| c.tick_pentas, |c| c.penta_min_headshots, headshots)
        {
            return true;
        }

        if type_flags & (FL_KILL_FLASHKILL | FL_KILL_SMOKEKILL) != 0
            && self.resolve(category, |c| c.tick_flash_smoke_kills)
        {
            return true;
        }

        if type_flags & FL_KILL_FLICKSHOT != 0
            && self.check_with_headshot(
                category,
                |c| c.tick_flickshots,
                |c| c.flickshot_headshot_only,
                headshot,
            )
        {
            return true;
        }

        if wallbang
            && self.wallbang_close_to_another_kill(category, time_to_closest_kill)
            && self.check_with_headshot(
                category,
                |c| c.tick_wallbangs,
                |c| c.wallbang_headshot_only,
                headshot,
            )
        {
            return true;
        }

        if type_flags & (FL_KILL_MIDAIR | FL_KILL_LADDERSHOT) != 0
            && self.check_with_distance(
                category,
                |c| c.tick_mid_air_kills,
                |c| c.mid_air_min_distance,
                |c| c.mid_air_min_distance_hs_modifier,
                |c| c.mid_air_min_distance_wb_modifier,
                distance,
                headshot,
                wallbang,
            )
        {
            return true;
        }

        // TODO: exclude noscopes done while running once the velocity props are tracked
        type_flags & FL_KILL_NOSCOPE != 0
            && self.check_with_distance(
                category,
                |c| c.tick_noscopes,
                |c| c.noscope_min_distance,
                |c| c.noscope_min_distance_hs_modifier,
                |c| c.noscope_min_distance_wb_modifier,
                distance,
                headshot,
                wallbang,
            )
    }
}
