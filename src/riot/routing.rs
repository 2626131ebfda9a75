use strum_macros::{Display, EnumIter, EnumString};

/// Platform shards the provider hosts game data on. Summoner, league and
/// spectator endpoints route here.
#[derive(Debug, Display, EnumString, EnumIter, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Platform {
    Br1,
    Eun1,
    Euw1,
    Jp1,
    Kr,
    La1,
    La2,
    Na1,
    Oc1,
    Tr1,
    Ru,
    Ph2,
    Sg2,
    Th2,
    Tw2,
    Vn2,
}

/// Regional routing clusters. Account and match endpoints route here.
#[derive(Debug, Display, EnumString, EnumIter, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Region {
    Americas,
    Europe,
    Asia,
    Sea,
}

impl Platform {
    /// The fixed platform→region map, enforced at call time.
    pub fn region(self) -> Region {
        match self {
            Platform::Br1 | Platform::La1 | Platform::La2 | Platform::Na1 => Region::Americas,
            Platform::Eun1 | Platform::Euw1 | Platform::Tr1 | Platform::Ru => Region::Europe,
            Platform::Jp1 | Platform::Kr => Region::Asia,
            Platform::Oc1
            | Platform::Ph2
            | Platform::Sg2
            | Platform::Th2
            | Platform::Tw2
            | Platform::Vn2 => Region::Sea,
        }
    }

    pub fn host(self) -> String {
        format!("https://{}.api.riotgames.com", self)
    }
}

impl Region {
    pub fn host(self) -> String {
        format!("https://{}.api.riotgames.com", self)
    }
}

/// Endpoint families the method buckets key on.
#[derive(Debug, Display, EnumString, EnumIter, Clone, Copy, PartialEq, Eq, Hash)]
#[strum(serialize_all = "snake_case")]
pub enum MethodFamily {
    AccountByRiotId,
    AccountByPuuid,
    SummonerByPuuid,
    MatchIdsByPuuid,
    MatchById,
    LeagueEntries,
    ActiveGame,
}
