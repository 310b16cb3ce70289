//! Friendly display names derived from a peer's listen port.

const ADJECTIVES: [&str; 17] = [
    "Brave", "Coward", "Strong", "High", "Golden", "Heavy", "Mighty", "Handsome", "Fast", "Slow",
    "Red", "Green", "Black", "Orange", "Attractive", "Lazy", "Nasty",
];

const ANIMALS: [&str; 25] = [
    "Monkey 🙉",
    "Monke 🐒",
    "Gorilla 🦍",
    "Dog 🐕",
    "Orangutan 🦧",
    "Poodle 🐩",
    "Wolf 🐺",
    "Fox 🦊",
    "Raccoon 🦝",
    "Cat 🐱",
    "Lion 🦁",
    "Horse 🐴",
    "Unicorn 🦄",
    "Pig 🐷",
    "Goat 🐐",
    "Elephant 🐘",
    "Mouse 🐭",
    "Hamster 🐹",
    "Rabbit 🐰",
    "Bat 🦇",
    "Koala 🐨",
    "Duck 🦆",
    "Frog 🐸",
    "Parrot 🦜",
    "T-Rex 🦖",
];

/// Nickname for a port number.
pub fn nickname(port: u16) -> String {
    let adjective = ADJECTIVES[usize::from(port & 0xf)];
    let animal = ANIMALS[usize::from(port >> 8) % ANIMALS.len()];
    format!("{} {}", adjective, animal)
}

/// Nickname for a `host:port` address, or the address itself if it has no port.
pub fn nickname_for_address(address: &str) -> String {
    address
        .rsplit_once(':')
        .and_then(|(_, port)| port.parse::<u16>().ok())
        .map(nickname)
        .unwrap_or_else(|| address.to_string())
}
