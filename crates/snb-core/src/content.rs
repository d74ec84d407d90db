//! Static content served by the commands: option groups for `/search`,
//! direct-match links, social links and snail facts.
//!
//! Built-in defaults can be replaced from a JSON file (`CATALOG_PATH`); any
//! section missing from the file keeps its default.

use std::{fs, path::Path};

use rand::seq::SliceRandom;
use serde::Deserialize;

use crate::Result;

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    #[serde(alias = "URL")]
    pub url: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct OptionGroup {
    pub name: String,
    pub options: Vec<Link>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Catalog {
    pub objects: Vec<Link>,
    pub option_groups: Vec<OptionGroup>,
    pub socials: Vec<Link>,
    pub snail_facts: Vec<String>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            objects: Vec::new(),
            option_groups: default_option_groups(),
            socials: vec![
                link("Linktree", "https://linktr.ee/snailsnft"),
                link("Medium", "https://medium.com/@snailsnft/"),
                link(
                    "OmniFlix",
                    "https://omniflix.tv/channel/65182782e1c28773aa199c84",
                ),
                link("YouTube", "https://www.youtube.com/@SNAILS._/videos"),
            ],
            snail_facts: [
                "Snails can sleep for up to three years.",
                "A garden snail has thousands of tiny teeth on its radula.",
                "Snails are hermaphrodites: each one has both male and female organs.",
                "The slime trail helps snails glide and protects them from sharp edges.",
                "Most land snails have four tentacles; the upper pair carries the eyes.",
                "The giant African land snail can grow to about 20 cm long.",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }
}

impl Catalog {
    /// Load the catalog from `path`, or the built-in defaults when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Exact, case-insensitive match against the direct-link table.
    pub fn find_object(&self, query: &str) -> Option<&Link> {
        self.objects
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(query.trim()))
    }

    pub fn find_group(&self, query: &str) -> Option<&OptionGroup> {
        self.option_groups
            .iter()
            .find(|g| g.name.eq_ignore_ascii_case(query.trim()))
    }

    pub fn option(&self, group: &str, index: usize) -> Option<&Link> {
        self.find_group(group)?.options.get(index)
    }

    pub fn random_fact(&self) -> Option<&str> {
        self.snail_facts
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }
}

/// Callback payload of an option button: which group, which option, and who
/// may press it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptionSelection {
    pub group: String,
    pub index: usize,
    pub initiator: i64,
}

const OPTION_PREFIX: &str = "option_";

impl OptionSelection {
    pub fn encode(&self) -> String {
        format!(
            "{OPTION_PREFIX}{}_{}_{}",
            self.group, self.index, self.initiator
        )
    }

    /// Parse `option_{group}_{index}_{initiator}`. The group may itself
    /// contain underscores; index and initiator are taken from the right.
    pub fn decode(data: &str) -> Option<Self> {
        let rest = data.strip_prefix(OPTION_PREFIX)?;
        let mut parts = rest.rsplitn(3, '_');
        let initiator = parts.next()?.parse::<i64>().ok()?;
        let index = parts.next()?.parse::<usize>().ok()?;
        let group = parts.next()?;
        if group.is_empty() {
            return None;
        }
        Some(Self {
            group: group.to_string(),
            index,
            initiator,
        })
    }
}

/// Wrap a snail fact in one of a few greetings, picked at random.
pub fn fact_greeting(name: &str, fact: &str) -> String {
    const TEMPLATES: [&str; 4] = [
        "🐌 Hey {name}, did you know? {fact}",
        "🐌 Hello {name}! Here's a cool snail fact: {fact}",
        "🐌 Fun fact for you, {name}: {fact}",
        "🐌 {name}, check out this snail fact: {fact}",
    ];
    let template = TEMPLATES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(TEMPLATES[0]);
    template.replace("{name}", name).replace("{fact}", fact)
}

/// Command list shown by `/help` and in the welcome message.
pub const COMMAND_LIST: &str = "/help - Get help with using the bot\n\
/search [query] - Search for an object\n\
/snails - Get a random snail fact\n\
/socials - Get our social media links";

fn link(name: &str, url: &str) -> Link {
    Link {
        name: name.to_string(),
        url: url.to_string(),
    }
}

fn group(name: &str, options: &[(&str, &str)]) -> OptionGroup {
    OptionGroup {
        name: name.to_string(),
        options: options.iter().map(|(n, u)| link(n, u)).collect(),
    }
}

fn default_option_groups() -> Vec<OptionGroup> {
    vec![
        group(
            "staking",
            &[
                ("Staking Platforms", "https://omniflix.tv/iv/657ccb6bd661a858ffc70aed"),
                ("Stake ATOM Using Keplr", "https://medium.com/@snailsnft/stake-atom-using-keplr-f13f277089b4"),
                ("Stake ATOM using Cosmostation", "https://medium.com/@snailsnft/stake-atom-using-cosmostation-c66276aaa13a"),
            ],
        ),
        group(
            "Wallets",
            &[
                ("Leap Snaps", "https://omniflix.tv/iv/657ccf58d661a858ffc71434"),
                ("Keplr", "https://omniflix.tv/iv/657ccf58d661a858ffc71434"),
            ],
        ),
        group(
            "Bridge",
            &[("Squid Router", "https://omniflix.tv/iv/657ccf08d661a858ffc712bb")],
        ),
        group(
            "Slime",
            &[
                ("Crypto Dungeon", "https://omniflix.tv/iv/6780721530410bfd64fb4eb5"),
                ("NFT Nashville", "https://omniflix.tv/iv/6706ad7bb36f71b560a587db"),
                ("AEZ", "https://omniflix.tv/iv/66ce3cb54b00063ef5920bb2"),
            ],
        ),
        group(
            "Technical",
            &[
                ("Sentry Node", "https://medium.com/@snailsnft/sentry-node-array-tutorial-c9401c3d3ff3"),
                ("FAQ - Node & Validator", "https://medium.com/@snailsnft/faq-node-validator-73cf5380b1ad"),
            ],
        ),
        group(
            "Secret",
            &[
                ("Secret Overview", "https://omniflix.tv/iv/65b65696c65a434875168589"),
                ("Shade Protocol", "https://omniflix.tv/iv/65a7d92a59f3c03dc394e3be"),
            ],
        ),
        group(
            "Atom",
            &[
                ("The Future of the ATOM Economic Zone", "https://medium.com/@snailsnft/the-future-of-the-atom-economic-zone-b3396347fb56"),
                ("AEZ SLIME. Time Challenge", "https://omniflix.tv/iv/66ce3cb54b00063ef5920bb2"),
                ("Entering the Cosmos", "https://medium.com/@snailsnft/entering-the-cosmos-ecosystem-a70f1c5bf4a3"),
            ],
        ),
        group(
            "DVPN",
            &[("Meile", "https://omniflix.tv/iv/657cd383d661a858ffc71dec")],
        ),
    ]
}
