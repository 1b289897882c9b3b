use std::io;

use serde::{Deserialize, Serialize};
use serde_json::ser::{Formatter, Serializer};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Category {
    pub name: String,
    pub description: String,
    pub slug: String,
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Product {
    pub title: String,
    pub price_excl_tax: String,
    pub price_incl_tax: String,
    pub category: String,
    pub description: String,
    pub is_active: bool,
}

/// Example payload embedded in the system prompt to steer the model's
/// output shape. Responses are never checked against it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SampleSchema {
    pub categories: Vec<Category>,
    pub products: Vec<Product>,
}

fn category(name: &str, description: &str, slug: &str) -> Category {
    Category {
        name: name.to_string(),
        description: description.to_string(),
        slug: slug.to_string(),
        is_active: true,
    }
}

fn product(title: &str, price: &str, category: &str, description: &str) -> Product {
    Product {
        title: title.to_string(),
        price_excl_tax: price.to_string(),
        price_incl_tax: price.to_string(),
        category: category.to_string(),
        description: description.to_string(),
        is_active: true,
    }
}

impl SampleSchema {
    pub fn sample() -> Self {
        SampleSchema {
            categories: vec![
                category("Seafood", "Various seafood dishes", "seafood"),
                category(
                    "Chef's Specialties",
                    "Specialty dishes prepared by the chef",
                    "chefs-specialties",
                ),
                category("Noodles", "Various noodle dishes", "noodles"),
            ],
            products: vec![
                product(
                    "Shrimp with Broccoli",
                    "14.45",
                    "Seafood",
                    "Shrimp with broccoli",
                ),
                product(
                    "Shrimp with Chinese Vegetables",
                    "14.45",
                    "Seafood",
                    "Shrimp with Chinese vegetables",
                ),
            ],
        }
    }

    /// Single-line JSON with `", "` and `": "` separators, as it appears
    /// inside the prompt.
    pub fn to_prompt_json(&self) -> Result<String, serde_json::Error> {
        let mut bytes = Vec::new();
        let mut ser = Serializer::with_formatter(&mut bytes, SpacedFormatter);
        self.serialize(&mut ser)?;
        // serde_json only ever writes UTF-8
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}
