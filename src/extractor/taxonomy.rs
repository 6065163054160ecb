//! Two-level category taxonomy.
//!
//! Pages render either a parent category name ("Games") or a subcategory
//! name ("Tabletop Games") in the same slot. [`resolve`] maps whichever
//! form appears back to the `(parent, subcategory)` pair. A handful of
//! subcategory names repeat across parents ("Comedy", "Spaces", "Web");
//! those resolve to the first parent in table order, matching how the
//! records have always been filed.

use std::error::Error;
use std::fmt;

/// Parent categories with their subcategory sets, in canonical order.
pub const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Art",
        &[
            "Ceramics",
            "Conceptual Art",
            "Digital Art",
            "Illustration",
            "Installations",
            "Mixed Media",
            "Painting",
            "Performance Art",
            "Public Art",
            "Sculpture",
            "Social Practice",
            "Textiles",
            "Video Art",
        ],
    ),
    (
        "Comics",
        &[
            "Anthologies",
            "Comic Books",
            "Events",
            "Graphic Novels",
            "Webcomics",
        ],
    ),
    (
        "Crafts",
        &[
            "Candles",
            "Crochet",
            "DIY",
            "Embroidery",
            "Glass",
            "Knitting",
            "Pottery",
            "Printing",
            "Quilts",
            "Stationery",
            "Taxidermy",
            "Weaving",
            "Woodworking",
        ],
    ),
    ("Dance", &["Performances", "Residencies", "Spaces", "Workshops"]),
    (
        "Design",
        &[
            "Architecture",
            "Civic Design",
            "Graphic Design",
            "Interactive Design",
            "Product Design",
            "Toys",
            "Typography",
        ],
    ),
    (
        "Fashion",
        &[
            "Accessories",
            "Apparel",
            "Childrenswear",
            "Couture",
            "Footwear",
            "Jewelry",
            "Pet Fashion",
            "Ready-to-wear",
        ],
    ),
    (
        "Film & Video",
        &[
            "Action",
            "Animation",
            "Comedy",
            "Documentary",
            "Drama",
            "Experimental",
            "Family",
            "Fantasy",
            "Festivals",
            "Horror",
            "Movie Theaters",
            "Music Videos",
            "Narrative Film",
            "Romance",
            "Science Fiction",
            "Shorts",
            "Television",
            "Thrillers",
            "Webseries",
        ],
    ),
    (
        "Food",
        &[
            "Bacon",
            "Community Gardens",
            "Cookbooks",
            "Drinks",
            "Events",
            "Farmer's Markets",
            "Farms",
            "Food Trucks",
            "Restaurants",
            "Small Batch",
            "Spaces",
            "Vegan",
        ],
    ),
    (
        "Games",
        &[
            "Gaming Hardware",
            "Live Games",
            "Mobile Games",
            "Playing Cards",
            "Puzzles",
            "Tabletop Games",
            "Video Games",
        ],
    ),
    ("Journalism", &["Audio", "Photo", "Print", "Video", "Web"]),
    (
        "Music",
        &[
            "Blues",
            "Chiptune",
            "Classical Music",
            "Comedy",
            "Country & Folk",
            "Electronic Music",
            "Faith",
            "Hip-Hop",
            "Indie Rock",
            "Jazz",
            "Kids",
            "Latin",
            "Metal",
            "Pop",
            "Punk",
            "R&B",
            "Rock",
            "World Music",
        ],
    ),
    (
        "Photography",
        &["Animals", "Fine Art", "Nature", "People", "Photobooks", "Places"],
    ),
    (
        "Publishing",
        &[
            "Academic",
            "Anthologies",
            "Art Books",
            "Calendars",
            "Children's Books",
            "Comedy",
            "Fiction",
            "Letterpress",
            "Literary Journals",
            "Literary Spaces",
            "Nonfiction",
            "Periodicals",
            "Poetry",
            "Radio & Podcasts",
            "Translations",
            "Young Adult",
            "Zines",
        ],
    ),
    (
        "Technology",
        &[
            "3D Printing",
            "Apps",
            "Camera Equipment",
            "DIY Electronics",
            "Fabrication Tools",
            "Flight",
            "Gadgets",
            "Hardware",
            "Makerspaces",
            "Robots",
            "Software",
            "Sound",
            "Space Exploration",
            "Wearables",
            "Web",
        ],
    ),
    (
        "Theater",
        &[
            "Comedy",
            "Experimental",
            "Festivals",
            "Immersive",
            "Musical",
            "Plays",
            "Spaces",
        ],
    ),
];

/// A category string that matches neither a parent name nor any known
/// subcategory. Surfaced to the caller so new site categories get noticed
/// instead of silently filed under the wrong parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized category label: {:?}", self.0)
    }
}

impl Error for UnknownCategory {}

/// Map a rendered category label to `(parent, subcategory)`.
pub fn resolve(raw: &str) -> Result<(&'static str, Option<&'static str>), UnknownCategory> {
    for (parent, _) in CATEGORIES {
        if raw == *parent {
            return Ok((parent, None));
        }
    }
    for (parent, subs) in CATEGORIES {
        for sub in *subs {
            if raw == *sub {
                return Ok((parent, Some(sub)));
            }
        }
    }
    Err(UnknownCategory(raw.to_string()))
}
