//! Query-generation prompt
//!
//! Constrains output to an enumerated whitelist of MongoDB shell operations
//! and enriches the user turn with schema text and token-budgeted sample
//! documents when available.

use serde_json::Value;

use super::{ModelInput, PromptContext, UserPrompt, assemble};
use crate::enrichment::stringify_sample_documents;

/// Arguments specific to query generation.
pub struct QueryPromptArgs<'a> {
    pub database_name: &'a str,
    pub collection_name: &'a str,
    pub schema: Option<&'a str>,
    pub sample_documents: &'a [Value],
}

pub struct QueryPrompt;

impl QueryPrompt {
    fn assistant_prompt(&self, args: &QueryPromptArgs) -> String {
        let schema_section = match args.schema {
            Some(schema) => format!("Collection schema:\n{schema}\n"),
            None => String::new(),
        };
        format!(
            r#"You are a MongoDB expert.

Your task is to help the user craft MongoDB queries and aggregation pipelines that perform their task.
Keep your response concise.
You should suggest queries that are performant and correct.
Respond with markdown, suggest code in a Markdown code block that begins with ```javascript and ends with ```.
Respond in MongoDB shell syntax using the ```javascript code block syntax.
You can use only the following MongoDB Shell commands: use, aggregate, bulkWrite, countDocuments, findOneAndReplace,
findOneAndUpdate, insert, insertMany, insertOne, remove, replaceOne, update, updateMany, updateOne.

Example 1:
use('');
db.getCollection('').aggregate([
  // Find all of the sales that occurred in 2014.
  {{ $match: {{ date: {{ $gte: new Date('2014-01-01'), $lt: new Date('2015-01-01') }} }} }},
  // Group the total sales for each product.
  {{ $group: {{ _id: '$item', totalSaleAmount: {{ $sum: {{ $multiply: [ '$price', '$quantity' ] }} }} }} }}
]);

Example 2:
use('');
db.getCollection('').find({{
  date: {{ $gte: new Date('2014-04-04'), $lt: new Date('2014-04-05') }}
}}).count();

Database name: {database}
Collection name: {collection}
{schema_section}
MongoDB command to specify database:
use('');

MongoDB command to specify collection:
db.getCollection('');

Concisely explain the code snippet you have generated."#,
            database = args.database_name,
            collection = args.collection_name,
        )
    }

    pub fn build_messages(&self, ctx: &PromptContext, args: &QueryPromptArgs) -> ModelInput {
        let assistant_text = self.assistant_prompt(args);

        assemble(assistant_text.clone(), ctx, true, None, |prompt| {
            let Some(model) = ctx.model else {
                return UserPrompt::plain(prompt);
            };

            let used_tokens =
                model.count_tokens(&assistant_text) + model.count_tokens(prompt);
            match stringify_sample_documents(args.sample_documents, used_tokens, model) {
                Some(sample) => UserPrompt {
                    text: format!("{prompt}\nSample documents from the collection:\n{sample}"),
                    has_sample_documents: true,
                },
                None => UserPrompt::plain(prompt),
            }
        })
    }
}
