use kopi_core::domain::outlet::Outlet;
use kopi_core::domain::product::ProductDocument;

use crate::connection::DbPool;
use crate::repositories::{
    OutletRepository, ProductDocumentRepository, RepositoryError, SqlOutletRepository,
    SqlProductDocumentRepository,
};

struct OutletSeed {
    name: &'static str,
    address: &'static str,
    city: &'static str,
    state: &'static str,
    status: &'static str,
    operating_hours: &'static str,
}

struct ProductSeed {
    slug: &'static str,
    name: &'static str,
    price: &'static str,
    body: &'static str,
}

const DAILY: &str = "8:00 AM - 10:00 PM Daily";
const EXTENDED: &str = "7:00 AM - 11:00 PM Daily";
const MALL: &str = "10:00 AM - 10:00 PM Daily";

const SEED_OUTLETS: &[OutletSeed] = &[
    OutletSeed {
        name: "ZUS Coffee KLCC",
        address: "Lot C-28, Concourse Level, Suria KLCC, Jalan Ampang, 50088 Kuala Lumpur",
        city: "Kuala Lumpur",
        state: "Kuala Lumpur",
        status: "Open",
        operating_hours: MALL,
    },
    OutletSeed {
        name: "ZUS Coffee Bangsar Baru",
        address: "22, Jalan Telawi 3, Bangsar Baru, 59100 Kuala Lumpur",
        city: "Kuala Lumpur",
        state: "Kuala Lumpur",
        status: "Open",
        operating_hours: EXTENDED,
    },
    OutletSeed {
        name: "ZUS Coffee Mid Valley Megamall",
        address: "LG-074, Mid Valley Megamall, Lingkaran Syed Putra, 59200 Kuala Lumpur",
        city: "Kuala Lumpur",
        state: "Kuala Lumpur",
        status: "Open",
        operating_hours: MALL,
    },
    OutletSeed {
        name: "ZUS Coffee Sri Petaling",
        address: "101, Jalan Radin Bagus, Bandar Baru Sri Petaling, 57000 Kuala Lumpur",
        city: "Kuala Lumpur",
        state: "Kuala Lumpur",
        status: "Open",
        operating_hours: DAILY,
    },
    OutletSeed {
        name: "ZUS Coffee Setapak Central",
        address: "G-27, Setapak Central, Jalan Taman Ibu Kota, 53300 Kuala Lumpur",
        city: "Kuala Lumpur",
        state: "Kuala Lumpur",
        status: "Closed",
        operating_hours: MALL,
    },
    OutletSeed {
        name: "ZUS Coffee Cheras Traders Square",
        address: "12, Jalan 2/101C, Cheras Traders Square, 56100 Kuala Lumpur",
        city: "Cheras",
        state: "Kuala Lumpur",
        status: "Open",
        operating_hours: DAILY,
    },
    OutletSeed {
        name: "ZUS Coffee SS2",
        address: "63, Jalan SS 2/64, SS 2, 47300 Petaling Jaya, Selangor",
        city: "Petaling Jaya",
        state: "Selangor",
        status: "Open",
        operating_hours: EXTENDED,
    },
    OutletSeed {
        name: "ZUS Coffee Damansara Uptown",
        address: "28, Jalan SS 21/39, Damansara Utama, 47400 Petaling Jaya, Selangor",
        city: "Petaling Jaya",
        state: "Selangor",
        status: "Open",
        operating_hours: DAILY,
    },
    OutletSeed {
        name: "ZUS Coffee SS15 Subang Jaya",
        address: "18, Jalan SS 15/4, SS 15, 47500 Subang Jaya, Selangor",
        city: "Subang Jaya",
        state: "Selangor",
        status: "Open",
        operating_hours: EXTENDED,
    },
    OutletSeed {
        name: "ZUS Coffee Shah Alam Seksyen 13",
        address: "G-5, Jalan Kristal 13/9, Seksyen 13, 40100 Shah Alam, Selangor",
        city: "Shah Alam",
        state: "Selangor",
        status: "Open",
        operating_hours: DAILY,
    },
    OutletSeed {
        name: "ZUS Coffee IOI Mall Puchong",
        address: "LG-32A, IOI Mall Puchong, Batu 9, Jalan Puchong, 47100 Puchong, Selangor",
        city: "Puchong",
        state: "Selangor",
        status: "Open",
        operating_hours: MALL,
    },
    OutletSeed {
        name: "ZUS Coffee Kajang Prima Saujana",
        address: "9, Jalan Prima Saujana 2/D, Taman Prima Saujana, 43000 Kajang, Selangor",
        city: "Kajang",
        state: "Selangor",
        status: "Closed",
        operating_hours: DAILY,
    },
];

const SEED_PRODUCTS: &[ProductSeed] = &[
    ProductSeed {
        slug: "zus-all-day-cup-500ml",
        name: "ZUS All Day Cup 500ml (17oz)",
        price: "RM 79.00",
        body: "The All Day Cup is a double-walled stainless steel tumbler that keeps drinks hot \
               for up to 6 hours and cold for up to 12 hours. It holds 500ml (17oz), ships with \
               a leak-proof screw lid and fits most car cup holders. Available in Mountain \
               Blue, Sky Blue, Thyme Green and Misty Blue. Hand wash only; not dishwasher or \
               microwave safe.",
    },
    ProductSeed {
        slug: "zus-og-ceramic-mug-350ml",
        name: "ZUS OG Ceramic Mug 350ml",
        price: "RM 39.00",
        body: "A glazed stoneware mug in the signature ZUS blue with the original logo. \
               Capacity 350ml. Dishwasher safe and microwave safe. Best for hot drinks at \
               home or in the office.",
    },
    ProductSeed {
        slug: "zus-frozee-cold-cup-650ml",
        name: "ZUS Frozee Cold Cup 650ml",
        price: "RM 55.00",
        body: "The Frozee Cold Cup is a BPA-free reusable plastic tumbler built for iced \
               drinks. It holds 650ml, includes a reusable straw and a splash-proof lid, and \
               is double-walled to reduce condensation. Colours: Frost White and Sundaze \
               Yellow. Not suitable for hot beverages.",
    },
    ProductSeed {
        slug: "zus-thermal-tumbler-600ml",
        name: "ZUS Thermal Tumbler 600ml",
        price: "RM 105.00",
        body: "A premium vacuum-insulated 316 stainless steel tumbler with a ceramic-coated \
               interior that does not retain coffee flavours. Capacity 600ml with a one-touch \
               flip lid. Keeps drinks hot for 8 hours or cold for 16 hours. Comes with a \
               one-year warranty against manufacturing defects.",
    },
    ProductSeed {
        slug: "zus-sundaze-collection-cup",
        name: "ZUS Sundaze Collection Cup 470ml",
        price: "RM 69.00",
        body: "Part of the limited Sundaze Collection. A stainless steel cup with a sliding \
               lid, 470ml capacity and a sunny yellow powder-coat finish. Bundles with a \
               free drink voucher redeemable in the ZUS app while stocks last.",
    },
    ProductSeed {
        slug: "zus-glass-double-wall-mug",
        name: "ZUS Double Wall Glass Mug 300ml",
        price: "RM 45.00",
        body: "A borosilicate double wall glass mug that stays cool to the touch. Capacity \
               300ml. Heat resistant up to 120 degrees Celsius and dishwasher safe. Ideal for \
               lattes so you can see the layers.",
    },
];

/// Deterministic outlet and drinkware dataset. Loading is an upsert by natural
/// key (outlet name, product slug) so it can be run repeatedly.
pub struct SeedDataset;

impl SeedDataset {
    pub fn outlets() -> Vec<Outlet> {
        SEED_OUTLETS
            .iter()
            .map(|seed| Outlet {
                name: seed.name.to_string(),
                address: seed.address.to_string(),
                city: seed.city.to_string(),
                state: seed.state.to_string(),
                status: seed.status.to_string(),
                operating_hours: seed.operating_hours.to_string(),
            })
            .collect()
    }

    pub fn products() -> Vec<ProductDocument> {
        SEED_PRODUCTS
            .iter()
            .map(|seed| ProductDocument {
                slug: seed.slug.to_string(),
                name: seed.name.to_string(),
                price: seed.price.to_string(),
                body: seed.body.to_string(),
            })
            .collect()
    }

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let outlets = SqlOutletRepository::new(pool.clone());
        let products = SqlProductDocumentRepository::new(pool.clone());

        let seeded_outlets = Self::outlets();
        for outlet in &seeded_outlets {
            outlets.upsert(outlet).await?;
        }

        let seeded_products = Self::products();
        for product in &seeded_products {
            products.upsert(product).await?;
        }

        Ok(SeedResult {
            outlets_seeded: seeded_outlets.len(),
            products_seeded: seeded_products.len(),
        })
    }

    /// Checks that every seeded record is present.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let mut outlets_present = 0usize;
        for seed in SEED_OUTLETS {
            let found: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM outlets WHERE name = ?1")
                .bind(seed.name)
                .fetch_one(pool)
                .await?;
            if found == 1 {
                outlets_present += 1;
            }
        }
        checks.push(("outlets_present", outlets_present == SEED_OUTLETS.len()));

        let states: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT state FROM outlets ORDER BY state")
                .fetch_all(pool)
                .await?;
        checks.push((
            "outlet_states_covered",
            states.iter().any(|state| state == "Kuala Lumpur")
                && states.iter().any(|state| state == "Selangor"),
        ));

        let mut products_present = 0usize;
        for seed in SEED_PRODUCTS {
            let found: i64 =
                sqlx::query_scalar("SELECT COUNT(1) FROM product_documents WHERE slug = ?1")
                    .bind(seed.slug)
                    .fetch_one(pool)
                    .await?;
            if found == 1 {
                products_present += 1;
            }
        }
        checks.push(("products_present", products_present == SEED_PRODUCTS.len()));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedResult {
    pub outlets_seeded: usize,
    pub products_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
