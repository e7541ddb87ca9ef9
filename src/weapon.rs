use std::fmt;

/// weapon ids in the order of the game's weapon alias table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum WeaponId {
    None = 0,
    P228,
    Glock,
    Scout,
    Xm1014,
    C4,
    Mac10,
    Aug,
    Elite,
    FiveSeven,
    Ump45,
    Sg550,
    Galil,
    Famas,
    Usp,
    Awp,
    Mp5Navy,
    M249,
    M3,
    M4a1,
    Tmp,
    G3sg1,
    Deagle,
    Sg552,
    Ak47,
    Knife,
    P90,
    World,
    HeGrenade,
    Flashbang,
    SmokeGrenade,
}

/// lowercased wire alias -> weapon
static WEAPON_ALIASES: phf::Map<&'static str, WeaponId> = phf::phf_map! {
    "none" => WeaponId::None,
    "p228" => WeaponId::P228,
    "glock" => WeaponId::Glock,
    "scout" => WeaponId::Scout,
    "xm1014" => WeaponId::Xm1014,
    "c4" => WeaponId::C4,
    "mac10" => WeaponId::Mac10,
    "aug" => WeaponId::Aug,
    "elite" => WeaponId::Elite,
    "fiveseven" => WeaponId::FiveSeven,
    "ump45" => WeaponId::Ump45,
    "sg550" => WeaponId::Sg550,
    "galil" => WeaponId::Galil,
    "famas" => WeaponId::Famas,
    "usp" => WeaponId::Usp,
    "awp" => WeaponId::Awp,
    "mp5navy" => WeaponId::Mp5Navy,
    "m249" => WeaponId::M249,
    "m3" => WeaponId::M3,
    "m4a1" => WeaponId::M4a1,
    "tmp" => WeaponId::Tmp,
    "g3sg1" => WeaponId::G3sg1,
    "deagle" => WeaponId::Deagle,
    "sg552" => WeaponId::Sg552,
    "ak47" => WeaponId::Ak47,
    "knife" => WeaponId::Knife,
    "p90" => WeaponId::P90,
    "world" => WeaponId::World,
    "hegrenade" => WeaponId::HeGrenade,
    "flashbang" => WeaponId::Flashbang,
    "smokegrenade_projectile" => WeaponId::SmokeGrenade,
};

impl WeaponId {
    /// looks up a weapon by the name used in death events, ignoring case
    pub fn from_alias(alias: &str) -> WeaponId {
        WEAPON_ALIASES
            .get(alias.to_ascii_lowercase().as_str())
            .copied()
            .unwrap_or(WeaponId::None)
    }

    /// the alias as sent over the wire
    pub fn alias(self) -> &'static str {
        match self {
            WeaponId::None => "NONE",
            WeaponId::P228 => "P228",
            WeaponId::Glock => "glock",
            WeaponId::Scout => "scout",
            WeaponId::Xm1014 => "XM1014",
            WeaponId::C4 => "C4",
            WeaponId::Mac10 => "MAC10",
            WeaponId::Aug => "AUG",
            WeaponId::Elite => "elite",
            WeaponId::FiveSeven => "fiveseven",
            WeaponId::Ump45 => "UMP45",
            WeaponId::Sg550 => "SG550",
            WeaponId::Galil => "galil",
            WeaponId::Famas => "famas",
            WeaponId::Usp => "USP",
            WeaponId::Awp => "AWP",
            WeaponId::Mp5Navy => "MP5navy",
            WeaponId::M249 => "M249",
            WeaponId::M3 => "M3",
            WeaponId::M4a1 => "M4A1",
            WeaponId::Tmp => "TMP",
            WeaponId::G3sg1 => "G3SG1",
            WeaponId::Deagle => "deagle",
            WeaponId::Sg552 => "SG552",
            WeaponId::Ak47 => "AK47",
            WeaponId::Knife => "knife",
            WeaponId::P90 => "P90",
            WeaponId::World => "WORLD",
            WeaponId::HeGrenade => "hegrenade",
            WeaponId::Flashbang => "flashbang",
            WeaponId::SmokeGrenade => "smokegrenade_projectile",
        }
    }

    /// name used in frag descriptions
    pub fn display_name(self) -> &'static str {
        match self {
            WeaponId::Mp5Navy => "MP5",
            WeaponId::Elite => "dualies",
            WeaponId::World => "unknown weapon",
            _ => self.alias(),
        }
    }

    pub fn category(self) -> WeaponCategory {
        match self {
            WeaponId::Knife => WeaponCategory::Knife,
            WeaponId::Glock
            | WeaponId::Usp
            | WeaponId::P228
            | WeaponId::Deagle
            | WeaponId::FiveSeven
            | WeaponId::Elite => WeaponCategory::Pistol,
            WeaponId::M3 | WeaponId::Xm1014 => WeaponCategory::Shotgun,
            WeaponId::Tmp | WeaponId::Mac10 | WeaponId::Mp5Navy | WeaponId::Ump45 | WeaponId::P90 => {
                WeaponCategory::Smg
            }
            WeaponId::Famas
            | WeaponId::Galil
            | WeaponId::M4a1
            | WeaponId::Ak47
            | WeaponId::Aug
            | WeaponId::Sg552
            | WeaponId::M249 => WeaponCategory::Rifle,
            WeaponId::Scout | WeaponId::Awp => WeaponCategory::Sniper,
            WeaponId::Sg550 | WeaponId::G3sg1 => WeaponCategory::AutoSniper,
            WeaponId::HeGrenade | WeaponId::Flashbang | WeaponId::SmokeGrenade => {
                WeaponCategory::Grenade
            }
            _ => WeaponCategory::General,
        }
    }

    pub fn is_sniper(self) -> bool {
        matches!(
            self,
            WeaponId::Awp | WeaponId::Scout | WeaponId::Sg550 | WeaponId::G3sg1
        )
    }

    pub fn uses_bullets(self) -> bool {
        !matches!(
            self,
            WeaponId::HeGrenade
                | WeaponId::Flashbang
                | WeaponId::SmokeGrenade
                | WeaponId::Knife
                | WeaponId::C4
        )
    }
}

impl fmt::Display for WeaponId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WeaponCategory {
    General = 0,
    Knife,
    Pistol,
    Shotgun,
    Smg,
    Rifle,
    /// awp and scout
    Sniper,
    AutoSniper,
    Grenade,
}

impl WeaponCategory {
    pub const COUNT: usize = 9;

    pub const ALL: [WeaponCategory; Self::COUNT] = [
        WeaponCategory::General,
        WeaponCategory::Knife,
        WeaponCategory::Pistol,
        WeaponCategory::Shotgun,
        WeaponCategory::Smg,
        WeaponCategory::Rifle,
        WeaponCategory::Sniper,
        WeaponCategory::AutoSniper,
        WeaponCategory::Grenade,
    ];

    /// settings table name, matched case-insensitively
    pub fn name(self) -> &'static str {
        match self {
            WeaponCategory::General => "general",
            WeaponCategory::Knife => "knife",
            WeaponCategory::Pistol => "pistols",
            WeaponCategory::Shotgun => "shotguns",
            WeaponCategory::Smg => "smgs",
            WeaponCategory::Rifle => "rifles",
            WeaponCategory::Sniper => "snipers",
            WeaponCategory::AutoSniper => "autosnipers",
            WeaponCategory::Grenade => "grenades",
        }
    }

    pub fn from_name(name: &str) -> Option<WeaponCategory> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// category of a multi-kill done with `weapons`, one entry per kill
    ///
    /// mixed 3ks and 4ks fall back to the general category, a 5k or more
    /// keeps the category holding all but one of the kills
    pub fn of_kills(weapons: &[WeaponId]) -> WeaponCategory {
        let mut counts = [0usize; Self::COUNT];
        for w in weapons {
            counts[w.category() as usize] += 1;
        }

        let used = counts.iter().filter(|&&n| n > 0).count();
        if used == 1 {
            return Self::ALL[counts.iter().position(|&n| n > 0).unwrap_or(0)];
        }

        if weapons.len() < 5 || used > 2 {
            return WeaponCategory::General;
        }

        counts
            .iter()
            .position(|&n| n + 1 == weapons.len())
            .map_or(WeaponCategory::General, |i| Self::ALL[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_are_case_insensitive() {
        assert_eq!(WeaponId::from_alias("ak47"), WeaponId::Ak47);
        assert_eq!(WeaponId::from_alias("AK47"), WeaponId::Ak47);
        assert_eq!(
            WeaponId::from_alias("smokegrenade_projectile"),
            WeaponId::SmokeGrenade
        );
        assert_eq!(WeaponId::from_alias("m4a1_silencer"), WeaponId::None);
        assert_eq!(WeaponId::from_alias(""), WeaponId::None);
    }

    #[test]
    fn display_names() {
        assert_eq!(WeaponId::Mp5Navy.to_string(), "MP5");
        assert_eq!(WeaponId::Elite.to_string(), "dualies");
        assert_eq!(WeaponId::World.to_string(), "unknown weapon");
        assert_eq!(WeaponId::Deagle.to_string(), "deagle");
    }

    #[test]
    fn bullets_and_snipers() {
        assert!(WeaponId::Awp.is_sniper());
        assert!(WeaponId::G3sg1.is_sniper());
        assert!(!WeaponId::Ak47.is_sniper());

        assert!(WeaponId::Ak47.uses_bullets());
        assert!(WeaponId::World.uses_bullets());
        assert!(!WeaponId::Knife.uses_bullets());
        assert!(!WeaponId::HeGrenade.uses_bullets());
    }

    #[test]
    fn multi_kill_category() {
        use WeaponId::*;

        assert_eq!(WeaponCategory::of_kills(&[Ak47, M4a1, Famas]), WeaponCategory::Rifle);
        assert_eq!(WeaponCategory::of_kills(&[Ak47, Ak47, Deagle]), WeaponCategory::General);
        assert_eq!(
            WeaponCategory::of_kills(&[Awp, Awp, Awp, Awp, Deagle]),
            WeaponCategory::Sniper
        );
        assert_eq!(
            WeaponCategory::of_kills(&[Awp, Awp, Awp, Deagle, Deagle]),
            WeaponCategory::General
        );
        assert_eq!(
            WeaponCategory::of_kills(&[Awp, Awp, Awp, Deagle, Knife]),
            WeaponCategory::General
        );
    }

    #[test]
    fn category_names() {
        assert_eq!(WeaponCategory::from_name("AutoSnipers"), Some(WeaponCategory::AutoSniper));
        assert_eq!(WeaponCategory::from_name("general"), Some(WeaponCategory::General));
        assert_eq!(WeaponCategory::from_name("lasers"), None);
    }
}
