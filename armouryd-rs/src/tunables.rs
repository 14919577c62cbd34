/* ROG power and thermal tunables: per-model limits and the model database.
 *
 * ASUS does not publish the accepted range of the PPT / NVIDIA tunables,
 * and the firmware offers no way to query them, so the limits come from
 * a table keyed on substrings of the DMI product name (which looks like
 * "ROG Flow X16 GV601VV_GV601VV_00185149B"). Extra `.model` files can be
 * dropped into the model directory to cover machines the built-in table
 * does not know about. */

use std::path::Path;

use configparser::ini::Ini;
use tracing::{debug, info, warn};

const PPT_CPU_LIMIT_MIN: u32 = 5;
const PPT_CPU_LIMIT_MAX: u32 = 150;
const PPT_CPU_LIMIT_DEFAULT: u32 = 80;
const PPT_PLATFORM_MIN: u32 = 5;
const PPT_PLATFORM_MAX: u32 = 100;
const PPT_PLATFORM_DEFAULT: u32 = 80;
const NVIDIA_BOOST_MIN: u32 = 5;
const NVIDIA_BOOST_MAX: u32 = 25;
const NVIDIA_TEMP_MIN: u32 = 75;
const NVIDIA_TEMP_MAX: u32 = 87;
const NVIDIA_POWER_MIN: u32 = 0;
const NVIDIA_POWER_MAX: u32 = 70;
const NVIDIA_POWER_DEFAULT: u32 = 70;

/* The limit groups shared by several attributes. */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunableGroup {
    Cpu,
    Platform,
    NvBoost,
    NvTemp,
    DgpuTgp,
}

/* Where the cached value of a write-only tunable starts out. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seed {
    CpuDefault,
    PlatformDefault,
    Min,
    Max,
}

/* An inclusive range with a default inside it. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min: u32,
    pub max: u32,
    pub default: u32,
}

impl Limits {
    fn new(min: u32, max: u32, default: u32) -> Self {
        let max = max.max(min);
        Self {
            min,
            max,
            default: default.clamp(min, max),
        }
    }

    #[cfg(test)]
    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RogTunables {
    pub cpu: Limits,
    pub platform: Limits,
    pub nv_boost: Limits,
    pub nv_temp: Limits,
    pub dgpu_tgp: Limits,
}

impl Default for RogTunables {
    fn default() -> Self {
        Self::from_overrides(&ModelOverrides::default())
    }
}

/* Per-model deviations from the base limits. `None` keeps the base value. */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelOverrides {
    pub cpu_default: Option<u32>,
    pub cpu_max: Option<u32>,
    pub platform_default: Option<u32>,
    pub platform_max: Option<u32>,
    pub boost_max: Option<u32>,
    pub tgp_max: Option<u32>,
}

impl ModelOverrides {
    /* Fill every field still unset from `other`. */
    fn or(self, other: &ModelOverrides) -> Self {
        Self {
            cpu_default: self.cpu_default.or(other.cpu_default),
            cpu_max: self.cpu_max.or(other.cpu_max),
            platform_default: self.platform_default.or(other.platform_default),
            platform_max: self.platform_max.or(other.platform_max),
            boost_max: self.boost_max.or(other.boost_max),
            tgp_max: self.tgp_max.or(other.tgp_max),
        }
    }
}

/* A model database entry loaded from a `.model` file. */
#[derive(Debug, Clone)]
pub struct ModelRule {
    pub name: String,
    pub matches: Vec<String>,
    pub overrides: ModelOverrides,
}

impl ModelRule {
    fn matches(&self, product: &str) -> bool {
        self.matches.iter().any(|m| product.contains(m.as_str()))
    }
}

struct CpuRule {
    needles: &'static [&'static str],
    default: Option<u32>,
    max: Option<u32>,
}

/* Checked in order, the first hit wins. */
static CPU_RULES: &[CpuRule] = &[
    CpuRule { needles: &["GA402R"], default: Some(125), max: None },
    CpuRule { needles: &["13QY"], default: None, max: Some(250) },
    CpuRule { needles: &["X13"], default: Some(50), max: Some(75) },
    CpuRule { needles: &["RC71", "RC72"], default: Some(30), max: Some(50) },
    CpuRule { needles: &["G814", "G614", "G834", "G634"], default: None, max: Some(175) },
    CpuRule {
        needles: &["GA402X", "GA403", "FA507N", "FA507X", "FA707N", "FA707X"],
        default: None,
        max: Some(90),
    },
];

static BOOST_RULES: &[(&str, u32)] = &[("GZ301ZE", 5), ("FX507ZC4", 15), ("GU605", 20)];

/* Overrides from the built-in tables for `product`. */
fn builtin_overrides(product: &str) -> ModelOverrides {
    let mut overrides = ModelOverrides::default();

    if let Some(rule) = CPU_RULES
        .iter()
        .find(|r| r.needles.iter().any(|n| product.contains(n)))
    {
        overrides.cpu_default = rule.default;
        overrides.cpu_max = rule.max;
    }

    overrides.boost_max = BOOST_RULES
        .iter()
        .find(|(needle, _)| product.contains(needle))
        .map(|(_, max)| *max);

    overrides
}

impl RogTunables {
    fn from_overrides(o: &ModelOverrides) -> Self {
        let cpu_default = o.cpu_default.unwrap_or(PPT_CPU_LIMIT_DEFAULT);
        let boost_max = o.boost_max.unwrap_or(NVIDIA_BOOST_MAX);

        Self {
            cpu: Limits::new(
                PPT_CPU_LIMIT_MIN,
                o.cpu_max.unwrap_or(PPT_CPU_LIMIT_MAX),
                cpu_default,
            ),
            platform: Limits::new(
                PPT_PLATFORM_MIN,
                o.platform_max.unwrap_or(PPT_PLATFORM_MAX),
                o.platform_default.unwrap_or(PPT_PLATFORM_DEFAULT),
            ),
            nv_boost: Limits::new(NVIDIA_BOOST_MIN, boost_max, NVIDIA_BOOST_MAX),
            nv_temp: Limits::new(NVIDIA_TEMP_MIN, NVIDIA_TEMP_MAX, NVIDIA_TEMP_MAX),
            dgpu_tgp: Limits::new(
                NVIDIA_POWER_MIN,
                o.tgp_max.unwrap_or(NVIDIA_POWER_MAX),
                NVIDIA_POWER_DEFAULT,
            ),
        }
    }

    /* Resolve the limits for a DMI product name. A matching database rule
     * takes precedence, fields it leaves unset come from the built-in table. */
    pub fn for_product(product: &str, database: &[ModelRule]) -> Self {
        let builtin = builtin_overrides(product);
        let overrides = match database.iter().find(|r| r.matches(product)) {
            Some(rule) => {
                info!("Using model database entry '{}' for {product}", rule.name);
                rule.overrides.clone().or(&builtin)
            }
            None => builtin,
        };
        debug!("Tunable overrides for '{product}': {overrides:?}");
        Self::from_overrides(&overrides)
    }

    /* First cached value of a tunable in `group`, clamped into its range. */
    pub fn seed(&self, group: TunableGroup, seed: Seed) -> u32 {
        let limits = self.limits(group);
        let value = match seed {
            Seed::CpuDefault => self.cpu.default,
            Seed::PlatformDefault => self.platform.default,
            Seed::Min => limits.min,
            Seed::Max => limits.max,
        };
        value.clamp(limits.min, limits.max)
    }

    pub fn limits(&self, group: TunableGroup) -> Limits {
        match group {
            TunableGroup::Cpu => self.cpu,
            TunableGroup::Platform => self.platform,
            TunableGroup::NvBoost => self.nv_boost,
            TunableGroup::NvTemp => self.nv_temp,
            TunableGroup::DgpuTgp => self.dgpu_tgp,
        }
    }
}

/* Load every `.model` file in `dir`, in file name order. A missing
 * directory is not an error; unparsable files are skipped with a warning. */
pub fn load_model_database(dir: &Path) -> Vec<ModelRule> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(err) => {
            debug!("No model database at {}: {}", dir.display(), err);
            return Vec::new();
        }
    };

    let mut paths: Vec<_> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("model"))
        .collect();
    paths.sort();

    let mut rules = Vec::new();
    for path in paths {
        let mut ini = Ini::new();
        let parsed = ini
            .load(&path)
            .map_err(|e| format!("INI parse error: {e}"))
            .and_then(|_| parse_model(&ini));
        match parsed {
            Ok(rule) => {
                debug!("Loaded model rule: {} ({} patterns)", rule.name, rule.matches.len());
                rules.push(rule);
            }
            Err(err) => warn!("Failed to parse {}: {}", path.display(), err),
        }
    }

    debug!("Model database loaded: {} entries", rules.len());
    rules
}

/* Parse a `.model` file:
 *
 * [Model]
 * Name=ROG Zephyrus G16 2025
 * Match=GU605C, GU605M
 *
 * [Limits]
 * CpuMax=120
 * BoostMax=25 */
fn parse_model(ini: &Ini) -> Result<ModelRule, String> {
    let name = ini.get("model", "name").ok_or("Missing [Model] Name")?;
    let match_str = ini.get("model", "match").ok_or("Missing [Model] Match")?;

    let matches: Vec<String> = match_str
        .split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect();
    if matches.is_empty() {
        return Err("Match is empty".to_string());
    }

    let number = |key: &str| -> Result<Option<u32>, String> {
        ini.get("limits", key)
            .map(|v| {
                v.trim()
                    .parse::<u32>()
                    .map_err(|e| format!("Invalid [Limits] {key}='{v}': {e}"))
            })
            .transpose()
    };

    Ok(ModelRule {
        name,
        matches,
        overrides: ModelOverrides {
            cpu_default: number("cpudefault")?,
            cpu_max: number("cpumax")?,
            platform_default: number("platformdefault")?,
            platform_max: number("platformmax")?,
            boost_max: number("boostmax")?,
            tgp_max: number("tgpmax")?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ini_from(text: &str) -> Ini {
        let mut ini = Ini::new();
        ini.read(text.to_string()).unwrap();
        ini
    }

    #[test]
    fn base_limits_for_unknown_product() {
        let t = RogTunables::for_product("Some Laptop", &[]);
        assert_eq!(t.cpu, Limits { min: 5, max: 150, default: 80 });
        assert_eq!(t.platform, Limits { min: 5, max: 100, default: 80 });
        assert_eq!(t.nv_boost, Limits { min: 5, max: 25, default: 25 });
        assert_eq!(t.nv_temp, Limits { min: 75, max: 87, default: 87 });
        assert_eq!(t.dgpu_tgp, Limits { min: 0, max: 70, default: 70 });
    }

    #[test]
    fn ga402r_raises_cpu_default() {
        let t = RogTunables::for_product("ROG Zephyrus G14 GA402RJ_GA402RJ", &[]);
        assert_eq!(t.cpu.default, 125);
        assert_eq!(t.cpu.max, 150);
    }

    #[test]
    fn ally_lowers_cpu_range() {
        let t = RogTunables::for_product("ROG Ally RC71L_RC71L", &[]);
        assert_eq!(t.cpu, Limits { min: 5, max: 50, default: 30 });
    }

    #[test]
    fn first_cpu_rule_wins() {
        /* "X13" matches before "GA403" could be considered */
        let t = RogTunables::for_product("ROG Flow X13 GA403", &[]);
        assert_eq!(t.cpu.max, 75);
    }

    #[test]
    fn boost_chain_is_independent_of_cpu_chain() {
        let t = RogTunables::for_product("ROG Zephyrus G16 GU605MI_GU605MI G614", &[]);
        assert_eq!(t.cpu.max, 175);
        assert_eq!(t.nv_boost.max, 20);
        /* the default never exceeds the model maximum */
        assert_eq!(t.nv_boost.default, 20);
    }

    #[test]
    fn database_rule_overrides_builtin() {
        let rule = parse_model(&ini_from(
            "[Model]\nName=Test G14\nMatch=GA402R\n[Limits]\nCpuDefault=60\nTgpMax=100\n",
        ))
        .unwrap();
        let t = RogTunables::for_product("ROG Zephyrus G14 GA402RK", &[rule]);
        assert_eq!(t.cpu.default, 60);
        assert_eq!(t.dgpu_tgp.max, 100);
    }

    #[test]
    fn database_rule_falls_back_to_builtin_fields() {
        let rule = parse_model(&ini_from("[Model]\nName=Ally\nMatch=RC71\n[Limits]\nBoostMax=10\n"))
            .unwrap();
        let t = RogTunables::for_product("ROG Ally RC71L", &[rule]);
        assert_eq!(t.cpu.max, 50);
        assert_eq!(t.nv_boost.max, 10);
    }

    #[test]
    fn parse_model_multiple_matches() {
        let rule = parse_model(&ini_from("[Model]\nName=G16\nMatch=GU605C, GU605M,\n")).unwrap();
        assert_eq!(rule.matches, vec!["GU605C".to_string(), "GU605M".to_string()]);
        assert_eq!(rule.overrides, ModelOverrides::default());
    }

    #[test]
    fn parse_model_rejects_missing_fields() {
        assert!(parse_model(&ini_from("[Model]\nName=x\n")).is_err());
        assert!(parse_model(&ini_from("[Model]\nName=x\nMatch= ,\n")).is_err());
        assert!(parse_model(&ini_from("[Model]\nName=x\nMatch=A\n[Limits]\nCpuMax=lots\n")).is_err());
    }

    #[test]
    fn default_is_clamped_into_range() {
        let l = Limits::new(5, 50, 80);
        assert_eq!(l.default, 50);
        assert!(l.contains(5) && l.contains(50) && !l.contains(51));
    }

    #[test]
    fn load_model_database_reads_model_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.model"),
            "[Model]\nName=B\nMatch=BBB\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.model"),
            "[Model]\nName=A\nMatch=AAA\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.model"), "[Model]\nName=C\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "[Model]\nName=D\nMatch=D\n").unwrap();

        let rules = load_model_database(dir.path());
        let names: Vec<_> = rules.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn load_model_database_missing_dir_is_empty() {
        assert!(load_model_database(Path::new("/nonexistent/models")).is_empty());
    }

    #[test]
    fn shipped_model_files_parse() {
        let dir = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/data/models"));
        let rules = load_model_database(dir);
        assert_eq!(rules.len(), 1);
        let t = RogTunables::for_product("ROG Zephyrus G16 GU605MV", &rules);
        assert_eq!((t.cpu.max, t.cpu.default), (120, 90));
    }

    #[test]
    fn seeds_follow_group_ranges() {
        let t = RogTunables::for_product("ROG Zephyrus G14 GA402RJ_GA402RJ", &[]);
        assert_eq!(t.seed(TunableGroup::Cpu, Seed::CpuDefault), 125);
        /* the CPU default is clamped into the platform range */
        assert_eq!(t.seed(TunableGroup::Platform, Seed::CpuDefault), 100);
        assert_eq!(t.seed(TunableGroup::Platform, Seed::PlatformDefault), 80);
        assert_eq!(t.seed(TunableGroup::NvBoost, Seed::Min), 5);
        assert_eq!(t.seed(TunableGroup::NvTemp, Seed::Min), 75);
        assert_eq!(t.seed(TunableGroup::DgpuTgp, Seed::Max), 70);
    }
}
